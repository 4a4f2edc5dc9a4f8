//! Structural decompiler for Ultima Underworld conversation scripts.
//!
//! The code segment is loaded into a [`CodeGraph`] of items in code order.
//! Passes then run per function, starting from `start` and following calls:
//!
//! 1. cross references label every jump, branch and call target;
//! 2. prologues and epilogues become function boundaries;
//! 3. opcodes become operators and expressions, which are combined into
//!    statements with correct operator precedence;
//! 4. branch patterns become `switch`, `while`, `do ... while` and `if`
//!    statements, and whatever jumps are left become `goto`s.
//!
//! The result is rendered as C-like pseudocode or as annotated disassembly.

mod control;
mod driver;
pub mod error;
pub mod functions;
pub mod graph;
pub mod intrinsics;
pub mod naming;
mod reducer;
pub mod render;
mod signature;
mod xrefs;

#[cfg(test)]
mod testing;

pub use driver::Decompiler;
pub use error::DecompileError;
pub use functions::{ArrayInfo, FuncInfo};
pub use graph::{CodeGraph, ExpressionItem, GraphItem, ItemId, ItemKind, OpcodeItem, OperatorItem, StatementItem};
pub use naming::DecompileOptions;
pub use render::{format_opcode, RenderOptions};

pub(crate) use driver::Worklist;
