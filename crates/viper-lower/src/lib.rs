//! Frontend-agnostic lowering services (`L5`) and control-flow lowering
//! (`L6`) onto [`viper_ir`] (§4.2, §4.3).
//!
//! Nothing here parses or type-checks a source language — frontends are out
//! of scope (§1 Non-goals). What lives here is the part every frontend would
//! otherwise have to reinvent: unique block naming, string interning and the
//! retain/release discipline that goes with it, a typed `(Value, Type)`
//! bookkeeping helper for expression lowering, a table-driven builtin
//! dispatcher, virtual/interface call sequences, and the `SELECT CASE` /
//! loop / `TRY`-`CATCH` skeletons described in §4.3.

mod block_namer;
mod builtins;
mod control;
mod dispatch;
mod rval;
mod runtime_abi;
mod select_case;
mod strings;

pub use block_namer::{BlockNamer, FallbackMangler};
pub use builtins::{BuiltinLowerContext, BuiltinRegistry, BuiltinRule, FeatureFlags, TrapGuard, ValueParseGuard};
pub use control::{lower_for, lower_foreach, lower_repeat, lower_try_catch, lower_while_do};
pub use dispatch::{emit_interface_call, emit_virtual_call};
pub use rval::{
    ensure_i64, extend_bool_to_i64, float_to_int, int_to_float, narrow_to_i32, RVal,
};
pub use runtime_abi::ensure_extern;
pub use select_case::{
    lower_select_case_numeric, lower_select_case_string, CmpOp, NumericArm, StringArm,
    DIAG_SELECT_CASE_LABEL_RANGE,
};
pub use strings::StringInterner;
