//! The extern registry (§4.5, §6): a process-wide map from a runtime
//! helper's name to its signature and host function pointer.
//!
//! Registrations are expected to complete before any VM starts running
//! (§5 "Cross-thread model") — the registry itself does no locking, mirroring
//! the "read-mostly" contract in §5.

use std::collections::HashMap;
use std::sync::Arc;
use viper_ir::Type;

/// A host-side argument or return value, classified into the register class
/// the calling convention would place it in (§4.5 "packs argument values
/// into a uniform calling frame").
#[derive(Clone, Debug, PartialEq)]
pub enum ArgValue {
    I64(i64),
    F64(f64),
    /// An opaque address (`Ptr`) or a string handle (`Str`) — both are
    /// GPR-class at the ABI boundary; the runtime bridge doesn't need to
    /// distinguish them further than "an integer-sized handle".
    Handle(u64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegClass {
    Gpr,
    Fpr,
}

impl ArgValue {
    pub fn reg_class(&self) -> RegClass {
        match self {
            ArgValue::F64(_) => RegClass::Fpr,
            ArgValue::I64(_) | ArgValue::Handle(_) => RegClass::Gpr,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ArgValue::I64(v) => Some(*v),
            ArgValue::Handle(v) => Some(*v as i64),
            ArgValue::F64(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ArgValue::F64(v) => Some(*v),
            _ => None,
        }
    }
}

/// Argument values split by register class, the shape the AArch64 calling
/// convention (§4.6) and the VM's own marshalling (§4.5) both pack towards:
/// GPR-class values in issue order, FPR-class values in issue order.
#[derive(Clone, Debug, Default)]
pub struct CallFrame {
    pub gpr: Vec<i64>,
    pub fpr: Vec<f64>,
}

impl CallFrame {
    pub fn pack(args: &[ArgValue]) -> Self {
        let mut frame = CallFrame::default();
        for a in args {
            match a {
                ArgValue::F64(v) => frame.fpr.push(*v),
                ArgValue::I64(v) => frame.gpr.push(*v),
                ArgValue::Handle(v) => frame.gpr.push(*v as i64),
            }
        }
        frame
    }
}

pub type HostFn = Arc<dyn Fn(&[ArgValue]) -> Result<Option<ArgValue>, String> + Send + Sync>;

/// A registered extern: its declared signature plus the host closure that
/// implements it.
#[derive(Clone)]
pub struct ExternDesc {
    pub name: String,
    pub param_tys: Vec<Type>,
    pub ret_ty: Type,
    pub func: HostFn,
}

impl std::fmt::Debug for ExternDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternDesc")
            .field("name", &self.name)
            .field("param_tys", &self.param_tys)
            .field("ret_ty", &self.ret_ty)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("extern `{0}` is already registered")]
    AlreadyRegistered(String),
    #[error("extern `{0}` is not registered")]
    NotRegistered(String),
}

/// Process-wide table of registered host externs. Not itself `Sync`-guarded
/// beyond what `HashMap` provides — callers are expected to finish
/// registering before running any VM concurrently (§5).
#[derive(Default)]
pub struct ExternRegistry {
    by_name: HashMap<String, ExternDesc>,
}

impl ExternRegistry {
    pub fn new() -> Self {
        ExternRegistry::default()
    }

    pub fn register(&mut self, desc: ExternDesc) -> Result<(), RegistryError> {
        if self.by_name.contains_key(&desc.name) {
            return Err(RegistryError::AlreadyRegistered(desc.name));
        }
        log::debug!("registering extern `{}`", desc.name);
        self.by_name.insert(desc.name.clone(), desc);
        Ok(())
    }

    /// Replace an existing registration, or insert if absent — for test
    /// harnesses that rebind the same name across runs.
    pub fn register_or_replace(&mut self, desc: ExternDesc) {
        self.by_name.insert(desc.name.clone(), desc);
    }

    pub fn unregister(&mut self, name: &str) -> Result<ExternDesc, RegistryError> {
        self.by_name.remove(name).ok_or_else(|| RegistryError::NotRegistered(name.to_string()))
    }

    pub fn lookup(&self, name: &str) -> Option<&ExternDesc> {
        self.by_name.get(name)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}
