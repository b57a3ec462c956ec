//! Pass 1: module shape (§4.4).
//!
//! Unique names within externs/globals/functions, each taken independently
//! (so `@len` can name both a global and a function without conflict, but
//! not two functions).

use hashbrown::HashSet;
use viper_ir::Module;
use viper_support::{Diagnostic, DiagnosticList};

pub fn verify(module: &Module, diags: &mut DiagnosticList) {
    check_unique(diags, "extern", module.externs.values().map(|e| e.name.as_str()));
    check_unique(diags, "global", module.globals.values().map(|g| g.name.as_str()));
    check_unique(diags, "function", module.functions.iter().map(|f| f.name.as_str()));
}

fn check_unique<'a>(diags: &mut DiagnosticList, category: &str, names: impl Iterator<Item = &'a str>) {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            diags.push(Diagnostic::error(
                "verify.module.duplicate_name",
                format!("duplicate {category} name `{name}`"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_ir::{Function, Type, Version};

    #[test]
    fn flags_duplicate_function_names() {
        let mut m = Module::new(Version::new(0, 2, Some(0)));
        m.add_function(Function::new("f", Type::Void, vec![]));
        m.add_function(Function::new("f", Type::Void, vec![]));
        let mut diags = DiagnosticList::new();
        verify(&m, &mut diags);
        assert!(diags.contains_code("verify.module.duplicate_name"));
    }
}
