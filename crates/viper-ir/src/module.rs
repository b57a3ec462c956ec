//! Modules: the version directive plus ordered externs, globals, and
//! functions (§3).

use crate::entities::{Extern, Global};
use crate::function::Function;
use crate::types::Type;
use cranelift_entity::PrimaryMap;

/// The `il <major>.<minor>[.<patch>]` header. The corpus observes both
/// `il 0.1` and `il 0.2.0`; any `<major>.<minor>[.<patch>]` is accepted and
/// preserved verbatim on round-trip (§9 Open Questions) — there is no
/// semantic-versioning enforcement here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: Option<u32>) -> Self {
        Version { major, minor, patch }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.patch {
            Some(p) => write!(f, "{}.{}.{}", self.major, self.minor, p),
            None => write!(f, "{}.{}", self.major, self.minor),
        }
    }
}

/// A declared external function: name plus signature.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternDecl {
    pub name: String,
    pub param_tys: Vec<Type>,
    pub ret_ty: Type,
}

/// A module-scoped named byte payload. `is_const` globals back interned
/// string literals (§4.2); bytes may contain embedded zeros, which must
/// survive `parse ∘ serialize` (§8 S-series, §6 encoding note).
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalDef {
    pub name: String,
    pub is_const: bool,
    pub bytes: Vec<u8>,
}

/// A module: the unit of compilation and the unit the parser/serializer and
/// verifier all operate on.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub version: Version,
    pub externs: PrimaryMap<Extern, ExternDecl>,
    pub globals: PrimaryMap<Global, GlobalDef>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(version: Version) -> Self {
        Module { version, externs: PrimaryMap::new(), globals: PrimaryMap::new(), functions: Vec::new() }
    }

    pub fn declare_extern(&mut self, decl: ExternDecl) -> Extern {
        self.externs.push(decl)
    }

    pub fn declare_global(&mut self, def: GlobalDef) -> Global {
        self.globals.push(def)
    }

    pub fn add_function(&mut self, f: Function) -> usize {
        self.functions.push(f);
        self.functions.len() - 1
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn extern_by_name(&self, name: &str) -> Option<(Extern, &ExternDecl)> {
        self.externs.iter().find(|(_, d)| d.name == name)
    }

    pub fn global_by_name(&self, name: &str) -> Option<(Global, &GlobalDef)> {
        self.globals.iter().find(|(_, g)| g.name == name)
    }

    /// Unique names within each category (§3 invariant: "Names must be
    /// unique within each category").
    pub fn has_unique_names(&self) -> bool {
        fn all_unique<'a>(names: impl Iterator<Item = &'a str>) -> bool {
            let mut seen = std::collections::HashSet::new();
            names.into_iter().all(|n| seen.insert(n))
        }
        all_unique(self.externs.values().map(|d| d.name.as_str()))
            && all_unique(self.globals.values().map(|g| g.name.as_str()))
            && all_unique(self.functions.iter().map(|f| f.name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_display_preserves_patch_presence() {
        assert_eq!(Version::new(0, 1, None).to_string(), "0.1");
        assert_eq!(Version::new(0, 2, Some(0)).to_string(), "0.2.0");
    }

    #[test]
    fn duplicate_function_names_are_rejected() {
        let mut m = Module::new(Version::new(0, 2, Some(0)));
        m.add_function(Function::new("f", Type::Void, vec![]));
        m.add_function(Function::new("f", Type::Void, vec![]));
        assert!(!m.has_unique_names());
    }
}
