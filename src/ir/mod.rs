//! Straight-line register IR
//!
//! The outliner only needs a small slice of a compiler IR: ordered
//! instruction lists per basic block, SSA values with a lattice type, use
//! counts, and a builder to materialize new method bodies. This module
//! provides exactly that.
//!
//! ```text
//! Program
//!  └─ Method (MethodId)
//!      ├─ values: [TypeElement]      indexed by ValueId
//!      └─ blocks: [Block]            indexed by BlockId
//!          ├─ instructions: [Instruction]
//!          ├─ successors
//!          └─ catch_handlers
//! ```
//!
//! Programs can be built with [`MethodBuilder`] or loaded from TOML.

mod builder;
mod display;
mod instruction;
mod method;
mod types;


pub use builder::MethodBuilder;
pub use instruction::{
    BinopKind, BlockId, ConstValue, InstrKind, Instruction, InvokeKind, MethodId, Operands,
    ValueId,
};
pub use method::{Block, CatchHandler, DefUse, Method, Program};
pub use types::{DexType, MethodRef, NumericType, Proto, TypeElement};
