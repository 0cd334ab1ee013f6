//! The intermediate representation.
//!
//! Programs are linear instruction lists in which every value is named by a
//! dense integer variable. Blocks are instruction pairs that open a nested
//! scope and possibly augment the active context.
//!
//! # Module Structure
//!
//! - `variable` - variable identifiers and bitset variable sets
//! - `context` - the context capability bitset
//! - `type_system` - the type lattice used for variable queries
//! - `operation` - the closed operation catalog
//! - `instruction` - operation plus inouts
//! - `code` - the append-only instruction list and its invariant checker
//! - `program` - finalized, immutable programs with lineage
//! - `wire` - the binary serialization format

pub use code::Code;
pub use context::Context;
pub use instruction::Instruction;
pub use operation::{
    BinaryOperator, Comparator, OpAttributes, Operation, RegExpFlags, UnaryOperator,
};
pub use program::Program;
pub use type_system::{Parameter, Signature, Type};
pub use variable::{MAX_VARIABLES, Variable, VariableSet};
pub use variable_map::VariableMap;

mod code;
mod context;
mod instruction;
mod operation;
mod program;
mod type_system;
mod variable;
mod variable_map;
mod wire;
