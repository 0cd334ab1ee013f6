//! Error types surfaced by the engine core.
//!
//! Builder invariant violations are programming errors and are additionally
//! caught by debug assertions on the hot paths; the `Result`-returning
//! surfaces exist so that `finalize` and the wire decoder can reject bad
//! input without aborting the process.

use std::fmt;

use crate::ir::Variable;

/// A violation of the code invariants: an out-of-scope input, mismatched
/// block nesting, or a broken variable numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    /// An input references a variable that was never defined.
    UndefinedInput { index: usize, variable: Variable },
    /// An input references a variable whose scope has already closed.
    OutOfScopeInput { index: usize, variable: Variable },
    /// An output variable broke the dense numbering.
    NonDenseVariable { index: usize, expected: usize, found: usize },
    /// A block end did not match the innermost open block.
    UnmatchedBlockEnd { index: usize },
    /// A block was still open when the program ended.
    UnterminatedBlock { index: usize },
    /// An instruction's required context was not active.
    ContextMismatch { index: usize },
    /// The program defines more variables than the engine supports.
    TooManyVariables { count: usize },
    /// An adoption session was still open when the builder finished.
    OpenAdoptionSession,
}

impl fmt::Display for BuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndefinedInput { index, variable } => {
                write!(f, "instruction {index} uses undefined variable {variable}")
            }
            Self::OutOfScopeInput { index, variable } => {
                write!(f, "instruction {index} uses out-of-scope variable {variable}")
            }
            Self::NonDenseVariable { index, expected, found } => write!(
                f,
                "instruction {index} defines v{found} but the next free variable is v{expected}"
            ),
            Self::UnmatchedBlockEnd { index } => {
                write!(f, "instruction {index} closes a block it did not open")
            }
            Self::UnterminatedBlock { index } => {
                write!(f, "block opened at instruction {index} is never closed")
            }
            Self::ContextMismatch { index } => {
                write!(f, "instruction {index} requires a context that is not active")
            }
            Self::TooManyVariables { count } => {
                write!(f, "program defines {count} variables, more than the supported maximum")
            }
            Self::OpenAdoptionSession => {
                write!(f, "an adoption session was still open at finalize")
            }
        }
    }
}

impl std::error::Error for BuilderError {}

/// Failure to splice from a donor program. Non-fatal; callers typically fall
/// back to code generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceError {
    /// The donor contained no instruction usable in the host context.
    NoCandidates,
    /// The chosen root produced an empty slice.
    EmptySlice,
}

impl fmt::Display for SpliceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCandidates => write!(f, "donor has no splice candidates in this context"),
            Self::EmptySlice => write!(f, "selected splice root produced an empty slice"),
        }
    }
}

impl std::error::Error for SpliceError {}

/// Failure of a code generator to run. Non-fatal; counted against the build
/// loop's consecutive-failure budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorError {
    /// Strict typed inputs could not be found among the visible variables.
    NoUsableInputs { generator: &'static str },
}

impl fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoUsableInputs { generator } => {
                write!(f, "generator {generator} found no usable inputs")
            }
        }
    }
}

impl std::error::Error for GeneratorError {}

/// Malformed bytes encountered while decoding a serialized program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The byte stream ended in the middle of a value.
    UnexpectedEof,
    /// A varint ran longer than the encodable maximum.
    VarintOverflow,
    /// A string payload was not valid UTF-8.
    InvalidString,
    /// An unknown operation tag.
    UnknownOperation { tag: u64 },
    /// The recorded inout count does not match the operation's arity.
    ArityMismatch { tag: u64 },
    /// The decoded instruction stream violates the code invariants.
    InvalidProgram(BuilderError),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::VarintOverflow => write!(f, "varint exceeds 64 bits"),
            Self::InvalidString => write!(f, "string payload is not valid UTF-8"),
            Self::UnknownOperation { tag } => write!(f, "unknown operation tag {tag}"),
            Self::ArityMismatch { tag } => {
                write!(f, "inout count does not match the arity of operation tag {tag}")
            }
            Self::InvalidProgram(err) => write!(f, "decoded program is invalid: {err}"),
        }
    }
}

impl std::error::Error for WireError {}

impl From<BuilderError> for WireError {
    fn from(err: BuilderError) -> Self {
        Self::InvalidProgram(err)
    }
}

/// Imported persistent state (evaluator bitmaps, corpus contents) does not
/// fit the current configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateImportError {
    /// The serialized blob could not be decoded at all.
    Malformed,
    /// The state was recorded for a different bitmap size.
    ShapeMismatch { expected: usize, found: usize },
}

impl fmt::Display for StateImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "evaluator state blob is malformed"),
            Self::ShapeMismatch { expected, found } => write!(
                f,
                "evaluator state has {found} edges but the instrumentation reports {expected}"
            ),
        }
    }
}

impl std::error::Error for StateImportError {}
