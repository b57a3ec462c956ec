//! The thread-local "active VM" slot (§4.5, §5, §9).
//!
//! Runtime helpers format trap messages with the calling VM's
//! function/block/loc; they find "the calling VM" through this slot rather
//! than through an explicit parameter, since they're invoked through a
//! C-ABI-shaped function pointer table (`ExternRegistry`) that doesn't carry
//! extra context arguments. The guard is scoped (RAII) and restores the
//! prior value on drop, the same shape `cranelift-codegen`'s own
//! `default_profiler` module uses for its thread-local "current pass"
//! stack: a `Cell` holding the current value, swapped on entry and restored
//! on drop so nested/recursive entry is automatic.
//!
//! The pointer is type-erased (`*mut ()`) because this crate has no
//! dependency on `viper-vm`'s `Vm` type — the dependency would be circular,
//! since `viper-vm` depends on `viper-runtime` for the bridge itself.
//! `viper-vm` is the only crate that ever calls [`enter`]/[`active_ptr`].

use std::cell::Cell;

thread_local! {
    static ACTIVE_VM: Cell<*mut ()> = const { Cell::new(std::ptr::null_mut()) };
}

/// A scoped guard that makes `vm` the thread's active VM for its lifetime.
/// Nested guards are supported (legitimate recursive extern calls back into
/// the interpreter) and restore the previous value, including `null`, when
/// dropped.
pub struct ActiveVmGuard {
    prev: *mut (),
}

impl ActiveVmGuard {
    /// Enter with `vm` (or `null` to explicitly clear the slot for the
    /// guard's lifetime) as the active VM.
    pub fn enter<T>(vm: *mut T) -> Self {
        let prev = ACTIVE_VM.with(|c| c.replace(vm as *mut ()));
        ActiveVmGuard { prev }
    }
}

impl Drop for ActiveVmGuard {
    fn drop(&mut self) {
        ACTIVE_VM.with(|c| c.set(self.prev));
    }
}

/// The current thread's active VM, if any guard is live. `None` outside any
/// guard's scope, matching `activeVMInstance() == nullptr` in the original.
///
/// # Safety
/// The caller must know `T` is the type of VM that entered the innermost
/// live guard on this thread; there is no dynamic type tag.
pub unsafe fn active_ptr<T>() -> Option<*mut T> {
    let raw = ACTIVE_VM.with(|c| c.get());
    if raw.is_null() {
        None
    } else {
        Some(raw as *mut T)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outside_any_guard_there_is_no_active_vm() {
        assert!(unsafe { active_ptr::<u8>() }.is_none());
    }

    #[test]
    fn nested_guards_restore_the_outer_value_on_drop() {
        let mut outer: u8 = 1;
        let _g1 = ActiveVmGuard::enter(&mut outer as *mut u8);
        assert_eq!(unsafe { active_ptr::<u8>() }, Some(&mut outer as *mut u8));
        {
            let mut inner: u8 = 2;
            let _g2 = ActiveVmGuard::enter(&mut inner as *mut u8);
            assert_eq!(unsafe { active_ptr::<u8>() }, Some(&mut inner as *mut u8));
        }
        assert_eq!(unsafe { active_ptr::<u8>() }, Some(&mut outer as *mut u8));
    }

    #[test]
    fn a_guard_may_clear_the_slot_with_a_null_pointer() {
        let _g = ActiveVmGuard::enter(std::ptr::null_mut::<u8>());
        assert!(unsafe { active_ptr::<u8>() }.is_none());
    }
}
