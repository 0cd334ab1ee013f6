//! Analyzers deriving state from an instruction stream.
//!
//! Analyzers consume instructions strictly in append order and maintain the
//! derived state the builder queries between appends: the visible variables,
//! the active context, and best-effort types.

pub use context::ContextAnalyzer;
pub use inference::TypeAnalyzer;
pub use scope::ScopeAnalyzer;

mod context;
mod inference;
mod scope;
