//! The shared typed SSA intermediate representation (`L2`/`L3` in the design
//! doc): the data model every other component reads or writes, plus the
//! textual serializer half of IL text I/O. The parser lives in
//! `viper-reader`; structural/type/EH checking lives in `viper-verify`.

mod block;
mod builder;
mod entities;
mod function;
mod instr;
mod module;
mod types;
mod value;
mod write;

pub use block::{BasicBlock, BlockParam};
pub use builder::IrBuilder;
pub use entities::{Block, Extern, Global, ValueId};
pub use function::Function;
pub use instr::{BranchTarget, Instruction, Opcode, SwitchCase};
pub use module::{ExternDecl, GlobalDef, Module, Version};
pub use types::Type;
pub use value::{Value, ValueData};
pub use write::{escape_bytes, write_module};
