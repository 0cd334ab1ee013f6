#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is bounds-checked")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts are intentional")]
#![expect(clippy::must_use_candidate, reason = "builder methods are used for effect too")]
#![expect(clippy::missing_panics_doc, reason = "asserted invariants are internal")]

pub mod analysis;
pub mod bandit;
pub mod builder;
pub mod config;
pub mod corpus;
pub mod environment;
pub mod errors;
pub mod evaluator;
pub mod events;
pub mod execution;
pub mod fuzzer;
pub mod generators;
pub mod ir;
pub mod minimizer;
pub mod mutators;

pub use crate::{
    bandit::{Exp3State, MutatorScheduler, ProgramScheduler},
    builder::{
        BuildMode, BuilderMode, ClassDefinitionBuilder, ObjectLiteralBuilder, ProgramBuilder,
        SwitchBuilder,
    },
    config::Config,
    corpus::{BasicCorpus, Corpus},
    environment::{Environment, INTERESTING_FLOATS, INTERESTING_INTEGERS},
    errors::{BuilderError, GeneratorError, SpliceError, StateImportError, WireError},
    evaluator::{Aspects, CoverageEvaluator, EdgeSet, Evaluator},
    events::{Event, Events, LogLevel, stderr_log_listener},
    execution::{Execution, MockRunner, Outcome, Runner, SharedEdgeMap, new_shared_edge_map},
    fuzzer::{Fuzzer, Stats},
    generators::{CodeGenerator, GeneratorLibrary, InputMode, builtin_generators},
    ir::{
        BinaryOperator, Code, Comparator, Context, Instruction, MAX_VARIABLES, OpAttributes,
        Operation, Parameter, Program, RegExpFlags, Signature, Type, UnaryOperator, Variable,
        VariableMap, VariableSet,
    },
    minimizer::MinimizationResult,
    mutators::{
        CodeGenMutator, CombineMutator, InputMutator, Mutator, OperationMutator, SpliceMutator,
        default_mutators,
    },
};
