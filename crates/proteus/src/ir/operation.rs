//! The operation catalog.
//!
//! Operations form a closed set: adding one requires touching the wire
//! encoding, the analyzers, and any lifter. Each variant carries its immutable
//! payload; arity, attributes, and context requirements are match-based
//! accessors so the compiler enforces exhaustiveness when the catalog grows.

use bitflags::bitflags;

use super::{context::Context, type_system::Signature};

bitflags! {
    /// Static attributes of an operation.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct OpAttributes: u32 {
        /// Opens a block (and a scope).
        const IS_BLOCK_BEGIN = 1 << 0;
        /// Closes a block. An operation may set both begin and end, e.g.
        /// `BeginElse` which ends the then-block and opens the else-block.
        const IS_BLOCK_END = 1 << 1;
        /// Engine-internal; never selected by generators or mutators.
        const IS_INTERNAL = 1 << 2;
        /// Performs a call into guest code.
        const IS_CALL = 1 << 3;
        /// May write through one of its inputs (rebinding a variable or
        /// mutating the contents of an object).
        const MAY_REASSIGN = 1 << 4;
        /// At most one output, no blocks, and purely local effects.
        const IS_SIMPLE = 1 << 5;
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum UnaryOperator {
    #[strum(serialize = "++x")]
    PreInc,
    #[strum(serialize = "--x")]
    PreDec,
    #[strum(serialize = "x++")]
    PostInc,
    #[strum(serialize = "x--")]
    PostDec,
    #[strum(serialize = "!")]
    LogicalNot,
    #[strum(serialize = "~")]
    BitwiseNot,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
}

impl UnaryOperator {
    pub const ALL: [Self; 8] = [
        Self::PreInc,
        Self::PreDec,
        Self::PostInc,
        Self::PostDec,
        Self::LogicalNot,
        Self::BitwiseNot,
        Self::Plus,
        Self::Minus,
    ];

    /// Returns true if the operator writes back to its operand.
    #[must_use]
    pub fn reassigns(self) -> bool {
        matches!(
            self,
            Self::PreInc | Self::PreDec | Self::PostInc | Self::PostDec
        )
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum BinaryOperator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "^")]
    Xor,
    #[strum(serialize = "<<")]
    LShift,
    #[strum(serialize = ">>")]
    RShift,
    #[strum(serialize = ">>>")]
    UnsignedRShift,
    #[strum(serialize = "&&")]
    LogicAnd,
    #[strum(serialize = "||")]
    LogicOr,
    #[strum(serialize = "**")]
    Exp,
}

impl BinaryOperator {
    pub const ALL: [Self; 14] = [
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::Mod,
        Self::BitAnd,
        Self::BitOr,
        Self::Xor,
        Self::LShift,
        Self::RShift,
        Self::UnsignedRShift,
        Self::LogicAnd,
        Self::LogicOr,
        Self::Exp,
    ];
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Comparator {
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "===")]
    StrictEqual,
    #[strum(serialize = "!==")]
    StrictNotEqual,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanOrEqual,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanOrEqual,
}

impl Comparator {
    pub const ALL: [Self; 8] = [
        Self::Equal,
        Self::NotEqual,
        Self::StrictEqual,
        Self::StrictNotEqual,
        Self::LessThan,
        Self::LessThanOrEqual,
        Self::GreaterThan,
        Self::GreaterThanOrEqual,
    ];
}

bitflags! {
    /// Regular expression flags.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct RegExpFlags: u32 {
        const CASE_INSENSITIVE = 1 << 0;
        const GLOBAL = 1 << 1;
        const MULTILINE = 1 << 2;
        const DOT_ALL = 1 << 3;
        const UNICODE = 1 << 4;
        const STICKY = 1 << 5;
    }
}

impl RegExpFlags {
    /// The flag string as it appears after a regexp literal.
    #[must_use]
    pub fn flag_string(self) -> String {
        let mut s = String::new();
        for (flag, ch) in [
            (Self::CASE_INSENSITIVE, 'i'),
            (Self::GLOBAL, 'g'),
            (Self::MULTILINE, 'm'),
            (Self::DOT_ALL, 's'),
            (Self::UNICODE, 'u'),
            (Self::STICKY, 'y'),
        ] {
            if self.contains(flag) {
                s.push(ch);
            }
        }
        s
    }
}

/// An operation in the intermediate representation.
///
/// Variant fields are the operation's immutable payload. Function-definition
/// begins additionally carry an optional [`Signature`] that only lives for
/// the duration of the program being built: it is dropped by the wire format
/// and not preserved across mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Nop,

    // Literals.
    LoadInteger { value: i64 },
    LoadBigInt { value: i64 },
    LoadFloat { value: f64 },
    LoadString { value: String },
    LoadBoolean { value: bool },
    LoadUndefined,
    LoadNull,
    LoadRegExp { pattern: String, flags: RegExpFlags },
    LoadBuiltin { name: String },
    LoadArguments,

    // Arrays.
    CreateArray { num_initial_values: u16 },
    CreateArrayWithSpread { spreads: Vec<bool> },
    CreateIntArray { values: Vec<i64> },
    CreateFloatArray { values: Vec<f64> },

    // Object literals.
    BeginObjectLiteral,
    ObjectLiteralAddProperty { name: String },
    ObjectLiteralCopyProperties,
    BeginObjectLiteralMethod { name: String, num_parameters: u16, signature: Option<Signature> },
    EndObjectLiteralMethod,
    EndObjectLiteral,

    // Class definitions.
    BeginClassDefinition { has_superclass: bool },
    ClassAddInstanceProperty { name: String, has_value: bool },
    BeginClassConstructor { num_parameters: u16, signature: Option<Signature> },
    EndClassConstructor,
    BeginClassInstanceMethod { name: String, num_parameters: u16, signature: Option<Signature> },
    EndClassInstanceMethod,
    EndClassDefinition,

    // Operators.
    UnaryOperation { op: UnaryOperator },
    BinaryOperation { op: BinaryOperator },
    TernaryOperation,
    Update { op: BinaryOperator },
    Dup,
    Reassign,
    Compare { op: Comparator },
    TypeOf,
    TestInstanceOf,
    TestIn,

    // Property and element traffic.
    GetProperty { name: String },
    SetProperty { name: String },
    DeleteProperty { name: String },
    GetElement { index: i64 },
    SetElement { index: i64 },
    GetComputedProperty,
    SetComputedProperty,

    // Calls.
    CallFunction { num_arguments: u16 },
    Construct { num_arguments: u16 },
    CallMethod { name: String, num_arguments: u16 },
    CallComputedMethod { num_arguments: u16 },

    // Function definitions.
    BeginPlainFunction { num_parameters: u16, signature: Option<Signature> },
    EndPlainFunction,
    BeginArrowFunction { num_parameters: u16, signature: Option<Signature> },
    EndArrowFunction,
    BeginGeneratorFunction { num_parameters: u16, signature: Option<Signature> },
    EndGeneratorFunction,
    BeginAsyncFunction { num_parameters: u16, signature: Option<Signature> },
    EndAsyncFunction,
    Return,
    Yield,
    Await,

    // Exceptions.
    ThrowException,
    BeginTry,
    BeginCatch,
    BeginFinally,
    EndTryCatchFinally,

    // Loops.
    BeginWhileLoop { comparator: Comparator },
    EndWhileLoop,
    BeginDoWhileLoop { comparator: Comparator },
    EndDoWhileLoop,
    BeginForLoop { comparator: Comparator, op: BinaryOperator },
    EndForLoop,
    BeginForInLoop,
    EndForInLoop,
    BeginForOfLoop,
    EndForOfLoop,
    LoopBreak,
    LoopContinue,

    // Conditionals.
    BeginIf { inverted: bool },
    BeginElse,
    EndIf,

    // Switch.
    BeginSwitch,
    BeginSwitchCase,
    BeginSwitchDefaultCase,
    EndSwitchCase,
    EndSwitch,
}

impl Operation {
    /// A short name for statistics and diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nop => "Nop",
            Self::LoadInteger { .. } => "LoadInteger",
            Self::LoadBigInt { .. } => "LoadBigInt",
            Self::LoadFloat { .. } => "LoadFloat",
            Self::LoadString { .. } => "LoadString",
            Self::LoadBoolean { .. } => "LoadBoolean",
            Self::LoadUndefined => "LoadUndefined",
            Self::LoadNull => "LoadNull",
            Self::LoadRegExp { .. } => "LoadRegExp",
            Self::LoadBuiltin { .. } => "LoadBuiltin",
            Self::LoadArguments => "LoadArguments",
            Self::CreateArray { .. } => "CreateArray",
            Self::CreateArrayWithSpread { .. } => "CreateArrayWithSpread",
            Self::CreateIntArray { .. } => "CreateIntArray",
            Self::CreateFloatArray { .. } => "CreateFloatArray",
            Self::BeginObjectLiteral => "BeginObjectLiteral",
            Self::ObjectLiteralAddProperty { .. } => "ObjectLiteralAddProperty",
            Self::ObjectLiteralCopyProperties => "ObjectLiteralCopyProperties",
            Self::BeginObjectLiteralMethod { .. } => "BeginObjectLiteralMethod",
            Self::EndObjectLiteralMethod => "EndObjectLiteralMethod",
            Self::EndObjectLiteral => "EndObjectLiteral",
            Self::BeginClassDefinition { .. } => "BeginClassDefinition",
            Self::ClassAddInstanceProperty { .. } => "ClassAddInstanceProperty",
            Self::BeginClassConstructor { .. } => "BeginClassConstructor",
            Self::EndClassConstructor => "EndClassConstructor",
            Self::BeginClassInstanceMethod { .. } => "BeginClassInstanceMethod",
            Self::EndClassInstanceMethod => "EndClassInstanceMethod",
            Self::EndClassDefinition => "EndClassDefinition",
            Self::UnaryOperation { .. } => "UnaryOperation",
            Self::BinaryOperation { .. } => "BinaryOperation",
            Self::TernaryOperation => "TernaryOperation",
            Self::Update { .. } => "Update",
            Self::Dup => "Dup",
            Self::Reassign => "Reassign",
            Self::Compare { .. } => "Compare",
            Self::TypeOf => "TypeOf",
            Self::TestInstanceOf => "TestInstanceOf",
            Self::TestIn => "TestIn",
            Self::GetProperty { .. } => "GetProperty",
            Self::SetProperty { .. } => "SetProperty",
            Self::DeleteProperty { .. } => "DeleteProperty",
            Self::GetElement { .. } => "GetElement",
            Self::SetElement { .. } => "SetElement",
            Self::GetComputedProperty => "GetComputedProperty",
            Self::SetComputedProperty => "SetComputedProperty",
            Self::CallFunction { .. } => "CallFunction",
            Self::Construct { .. } => "Construct",
            Self::CallMethod { .. } => "CallMethod",
            Self::CallComputedMethod { .. } => "CallComputedMethod",
            Self::BeginPlainFunction { .. } => "BeginPlainFunction",
            Self::EndPlainFunction => "EndPlainFunction",
            Self::BeginArrowFunction { .. } => "BeginArrowFunction",
            Self::EndArrowFunction => "EndArrowFunction",
            Self::BeginGeneratorFunction { .. } => "BeginGeneratorFunction",
            Self::EndGeneratorFunction => "EndGeneratorFunction",
            Self::BeginAsyncFunction { .. } => "BeginAsyncFunction",
            Self::EndAsyncFunction => "EndAsyncFunction",
            Self::Return => "Return",
            Self::Yield => "Yield",
            Self::Await => "Await",
            Self::ThrowException => "ThrowException",
            Self::BeginTry => "BeginTry",
            Self::BeginCatch => "BeginCatch",
            Self::BeginFinally => "BeginFinally",
            Self::EndTryCatchFinally => "EndTryCatchFinally",
            Self::BeginWhileLoop { .. } => "BeginWhileLoop",
            Self::EndWhileLoop => "EndWhileLoop",
            Self::BeginDoWhileLoop { .. } => "BeginDoWhileLoop",
            Self::EndDoWhileLoop => "EndDoWhileLoop",
            Self::BeginForLoop { .. } => "BeginForLoop",
            Self::EndForLoop => "EndForLoop",
            Self::BeginForInLoop => "BeginForInLoop",
            Self::EndForInLoop => "EndForInLoop",
            Self::BeginForOfLoop => "BeginForOfLoop",
            Self::EndForOfLoop => "EndForOfLoop",
            Self::LoopBreak => "LoopBreak",
            Self::LoopContinue => "LoopContinue",
            Self::BeginIf { .. } => "BeginIf",
            Self::BeginElse => "BeginElse",
            Self::EndIf => "EndIf",
            Self::BeginSwitch => "BeginSwitch",
            Self::BeginSwitchCase => "BeginSwitchCase",
            Self::BeginSwitchDefaultCase => "BeginSwitchDefaultCase",
            Self::EndSwitchCase => "EndSwitchCase",
            Self::EndSwitch => "EndSwitch",
        }
    }

    /// Number of input variables.
    #[must_use]
    pub fn num_inputs(&self) -> usize {
        match self {
            Self::Nop
            | Self::LoadInteger { .. }
            | Self::LoadBigInt { .. }
            | Self::LoadFloat { .. }
            | Self::LoadString { .. }
            | Self::LoadBoolean { .. }
            | Self::LoadUndefined
            | Self::LoadNull
            | Self::LoadRegExp { .. }
            | Self::LoadBuiltin { .. }
            | Self::LoadArguments
            | Self::CreateIntArray { .. }
            | Self::CreateFloatArray { .. }
            | Self::BeginObjectLiteral
            | Self::BeginObjectLiteralMethod { .. }
            | Self::EndObjectLiteralMethod
            | Self::EndObjectLiteral
            | Self::BeginClassConstructor { .. }
            | Self::EndClassConstructor
            | Self::BeginClassInstanceMethod { .. }
            | Self::EndClassInstanceMethod
            | Self::EndClassDefinition
            | Self::BeginPlainFunction { .. }
            | Self::EndPlainFunction
            | Self::BeginArrowFunction { .. }
            | Self::EndArrowFunction
            | Self::BeginGeneratorFunction { .. }
            | Self::EndGeneratorFunction
            | Self::BeginAsyncFunction { .. }
            | Self::EndAsyncFunction
            | Self::BeginTry
            | Self::BeginCatch
            | Self::BeginFinally
            | Self::EndTryCatchFinally
            | Self::EndWhileLoop
            | Self::EndDoWhileLoop
            | Self::EndForLoop
            | Self::EndForInLoop
            | Self::EndForOfLoop
            | Self::LoopBreak
            | Self::LoopContinue
            | Self::BeginElse
            | Self::EndIf
            | Self::BeginSwitchDefaultCase
            | Self::EndSwitchCase
            | Self::EndSwitch => 0,

            Self::ObjectLiteralCopyProperties
            | Self::UnaryOperation { .. }
            | Self::Dup
            | Self::TypeOf
            | Self::GetProperty { .. }
            | Self::DeleteProperty { .. }
            | Self::GetElement { .. }
            | Self::Return
            | Self::Yield
            | Self::Await
            | Self::ThrowException
            | Self::BeginForInLoop
            | Self::BeginForOfLoop
            | Self::BeginIf { .. }
            | Self::BeginSwitch
            | Self::BeginSwitchCase
            | Self::ObjectLiteralAddProperty { .. } => 1,

            Self::BinaryOperation { .. }
            | Self::Update { .. }
            | Self::Reassign
            | Self::Compare { .. }
            | Self::TestInstanceOf
            | Self::TestIn
            | Self::SetProperty { .. }
            | Self::SetElement { .. }
            | Self::GetComputedProperty
            | Self::BeginWhileLoop { .. }
            | Self::BeginDoWhileLoop { .. } => 2,

            Self::TernaryOperation | Self::SetComputedProperty | Self::BeginForLoop { .. } => 3,

            Self::BeginClassDefinition { has_superclass } => usize::from(*has_superclass),
            Self::ClassAddInstanceProperty { has_value, .. } => usize::from(*has_value),
            Self::CreateArray { num_initial_values } => *num_initial_values as usize,
            Self::CreateArrayWithSpread { spreads } => spreads.len(),
            Self::CallFunction { num_arguments } | Self::Construct { num_arguments } => {
                1 + *num_arguments as usize
            }
            Self::CallMethod { num_arguments, .. } => 1 + *num_arguments as usize,
            Self::CallComputedMethod { num_arguments } => 2 + *num_arguments as usize,
        }
    }

    /// Number of output variables, visible in the surrounding scope.
    #[must_use]
    pub fn num_outputs(&self) -> usize {
        match self {
            Self::LoadInteger { .. }
            | Self::LoadBigInt { .. }
            | Self::LoadFloat { .. }
            | Self::LoadString { .. }
            | Self::LoadBoolean { .. }
            | Self::LoadUndefined
            | Self::LoadNull
            | Self::LoadRegExp { .. }
            | Self::LoadBuiltin { .. }
            | Self::LoadArguments
            | Self::CreateArray { .. }
            | Self::CreateArrayWithSpread { .. }
            | Self::CreateIntArray { .. }
            | Self::CreateFloatArray { .. }
            | Self::EndObjectLiteral
            | Self::BeginClassDefinition { .. }
            | Self::UnaryOperation { .. }
            | Self::BinaryOperation { .. }
            | Self::TernaryOperation
            | Self::Dup
            | Self::Compare { .. }
            | Self::TypeOf
            | Self::TestInstanceOf
            | Self::TestIn
            | Self::GetProperty { .. }
            | Self::DeleteProperty { .. }
            | Self::GetElement { .. }
            | Self::GetComputedProperty
            | Self::CallFunction { .. }
            | Self::Construct { .. }
            | Self::CallMethod { .. }
            | Self::CallComputedMethod { .. }
            | Self::BeginPlainFunction { .. }
            | Self::BeginArrowFunction { .. }
            | Self::BeginGeneratorFunction { .. }
            | Self::BeginAsyncFunction { .. }
            | Self::Yield
            | Self::Await => 1,
            _ => 0,
        }
    }

    /// Number of inner output variables, visible only inside the block this
    /// operation opens (function parameters, loop induction variables, the
    /// caught exception, ...).
    #[must_use]
    pub fn num_inner_outputs(&self) -> usize {
        match self {
            Self::BeginObjectLiteralMethod { num_parameters, .. }
            | Self::BeginPlainFunction { num_parameters, .. }
            | Self::BeginArrowFunction { num_parameters, .. }
            | Self::BeginGeneratorFunction { num_parameters, .. }
            | Self::BeginAsyncFunction { num_parameters, .. } => *num_parameters as usize,
            // `this` plus the declared parameters.
            Self::BeginClassConstructor { num_parameters, .. }
            | Self::BeginClassInstanceMethod { num_parameters, .. } => 1 + *num_parameters as usize,
            Self::BeginForLoop { .. }
            | Self::BeginForInLoop
            | Self::BeginForOfLoop
            | Self::BeginCatch => 1,
            _ => 0,
        }
    }

    /// Static attributes.
    #[must_use]
    pub fn attributes(&self) -> OpAttributes {
        use OpAttributes as A;
        match self {
            Self::Nop => A::IS_INTERNAL,

            Self::LoadInteger { .. }
            | Self::LoadBigInt { .. }
            | Self::LoadFloat { .. }
            | Self::LoadString { .. }
            | Self::LoadBoolean { .. }
            | Self::LoadUndefined
            | Self::LoadNull
            | Self::LoadRegExp { .. }
            | Self::LoadBuiltin { .. }
            | Self::LoadArguments
            | Self::CreateArray { .. }
            | Self::CreateArrayWithSpread { .. }
            | Self::CreateIntArray { .. }
            | Self::CreateFloatArray { .. }
            | Self::BinaryOperation { .. }
            | Self::TernaryOperation
            | Self::Dup
            | Self::Compare { .. }
            | Self::TypeOf
            | Self::TestInstanceOf
            | Self::TestIn
            | Self::GetProperty { .. }
            | Self::GetElement { .. }
            | Self::GetComputedProperty => A::IS_SIMPLE,

            Self::UnaryOperation { op } => {
                if op.reassigns() {
                    A::MAY_REASSIGN
                } else {
                    A::IS_SIMPLE
                }
            }

            Self::Update { .. } | Self::Reassign => A::MAY_REASSIGN,
            Self::SetProperty { .. }
            | Self::SetElement { .. }
            | Self::SetComputedProperty
            | Self::DeleteProperty { .. } => A::MAY_REASSIGN,

            Self::CallFunction { .. }
            | Self::Construct { .. }
            | Self::CallMethod { .. }
            | Self::CallComputedMethod { .. } => A::IS_CALL,

            Self::BeginObjectLiteral
            | Self::BeginClassDefinition { .. }
            | Self::BeginClassConstructor { .. }
            | Self::BeginClassInstanceMethod { .. }
            | Self::BeginObjectLiteralMethod { .. }
            | Self::BeginPlainFunction { .. }
            | Self::BeginArrowFunction { .. }
            | Self::BeginGeneratorFunction { .. }
            | Self::BeginAsyncFunction { .. }
            | Self::BeginTry
            | Self::BeginWhileLoop { .. }
            | Self::BeginDoWhileLoop { .. }
            | Self::BeginForLoop { .. }
            | Self::BeginForInLoop
            | Self::BeginForOfLoop
            | Self::BeginIf { .. }
            | Self::BeginSwitch
            | Self::BeginSwitchCase
            | Self::BeginSwitchDefaultCase => A::IS_BLOCK_BEGIN,

            Self::BeginCatch | Self::BeginFinally | Self::BeginElse => {
                A::IS_BLOCK_BEGIN | A::IS_BLOCK_END
            }

            Self::EndObjectLiteralMethod
            | Self::EndObjectLiteral
            | Self::EndClassConstructor
            | Self::EndClassInstanceMethod
            | Self::EndClassDefinition
            | Self::EndPlainFunction
            | Self::EndArrowFunction
            | Self::EndGeneratorFunction
            | Self::EndAsyncFunction
            | Self::EndTryCatchFinally
            | Self::EndWhileLoop
            | Self::EndDoWhileLoop
            | Self::EndForLoop
            | Self::EndForInLoop
            | Self::EndForOfLoop
            | Self::EndIf
            | Self::EndSwitchCase
            | Self::EndSwitch => A::IS_BLOCK_END,

            Self::ObjectLiteralAddProperty { .. }
            | Self::ObjectLiteralCopyProperties
            | Self::ClassAddInstanceProperty { .. }
            | Self::Return
            | Self::Yield
            | Self::Await
            | Self::ThrowException
            | Self::LoopBreak
            | Self::LoopContinue => A::empty(),
        }
    }

    /// Contexts that must all be active for this operation to be emitted.
    #[must_use]
    pub fn required_context(&self) -> Context {
        match self {
            // Structural closers carry no requirement of their own; block
            // matching is enforced separately.
            Self::Nop
            | Self::EndObjectLiteralMethod
            | Self::EndObjectLiteral
            | Self::EndClassConstructor
            | Self::EndClassInstanceMethod
            | Self::EndClassDefinition
            | Self::EndPlainFunction
            | Self::EndArrowFunction
            | Self::EndGeneratorFunction
            | Self::EndAsyncFunction
            | Self::BeginCatch
            | Self::BeginFinally
            | Self::EndTryCatchFinally
            | Self::EndWhileLoop
            | Self::EndDoWhileLoop
            | Self::EndForLoop
            | Self::EndForInLoop
            | Self::EndForOfLoop
            | Self::BeginElse
            | Self::EndIf
            | Self::EndSwitchCase
            | Self::EndSwitch => Context::empty(),

            Self::ObjectLiteralAddProperty { .. }
            | Self::ObjectLiteralCopyProperties
            | Self::BeginObjectLiteralMethod { .. } => Context::OBJECT_LITERAL,

            Self::ClassAddInstanceProperty { .. }
            | Self::BeginClassConstructor { .. }
            | Self::BeginClassInstanceMethod { .. } => Context::CLASS_DEFINITION,

            Self::LoadArguments | Self::Return => Context::SCRIPT | Context::SUBROUTINE,
            Self::Yield => Context::SCRIPT | Context::GENERATOR_FUNCTION,
            Self::Await => Context::SCRIPT | Context::ASYNC_FUNCTION,
            Self::LoopBreak | Self::LoopContinue => Context::SCRIPT | Context::LOOP,

            Self::BeginSwitchCase | Self::BeginSwitchDefaultCase => Context::SWITCH_BLOCK,

            _ => Context::SCRIPT,
        }
    }

    /// Contexts that the block opened by this operation adds.
    #[must_use]
    pub fn opened_context(&self) -> Context {
        match self {
            Self::BeginObjectLiteral => Context::OBJECT_LITERAL,
            Self::BeginClassDefinition { .. } => Context::CLASS_DEFINITION,
            Self::BeginObjectLiteralMethod { .. }
            | Self::BeginClassConstructor { .. }
            | Self::BeginClassInstanceMethod { .. }
            | Self::BeginPlainFunction { .. }
            | Self::BeginArrowFunction { .. } => Context::SCRIPT | Context::SUBROUTINE,
            Self::BeginGeneratorFunction { .. } => {
                Context::SCRIPT | Context::SUBROUTINE | Context::GENERATOR_FUNCTION
            }
            Self::BeginAsyncFunction { .. } => {
                Context::SCRIPT | Context::SUBROUTINE | Context::ASYNC_FUNCTION
            }
            Self::BeginWhileLoop { .. }
            | Self::BeginDoWhileLoop { .. }
            | Self::BeginForLoop { .. }
            | Self::BeginForInLoop
            | Self::BeginForOfLoop => Context::LOOP,
            Self::BeginSwitch => Context::SWITCH_BLOCK,
            Self::BeginSwitchCase | Self::BeginSwitchDefaultCase => Context::SWITCH_CASE,
            _ => Context::empty(),
        }
    }

    /// True if this operation opens a block.
    #[inline]
    #[must_use]
    pub fn is_block_begin(&self) -> bool {
        self.attributes().contains(OpAttributes::IS_BLOCK_BEGIN)
    }

    /// True if this operation closes a block.
    #[inline]
    #[must_use]
    pub fn is_block_end(&self) -> bool {
        self.attributes().contains(OpAttributes::IS_BLOCK_END)
    }

    /// True for operations that both close one block and open the next part
    /// of the same construct (`BeginElse`, `BeginCatch`, `BeginFinally`).
    #[inline]
    #[must_use]
    pub fn is_block_continuation(&self) -> bool {
        self.is_block_begin() && self.is_block_end()
    }

    #[inline]
    #[must_use]
    pub fn is_call(&self) -> bool {
        self.attributes().contains(OpAttributes::IS_CALL)
    }

    #[inline]
    #[must_use]
    pub fn may_reassign(&self) -> bool {
        self.attributes().contains(OpAttributes::MAY_REASSIGN)
    }

    #[inline]
    #[must_use]
    pub fn is_simple(&self) -> bool {
        self.attributes().contains(OpAttributes::IS_SIMPLE)
    }

    #[inline]
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.attributes().contains(OpAttributes::IS_INTERNAL)
    }

    /// True if this operation may not serve as a splice target because its
    /// validity depends on uniqueness within the surrounding block.
    #[must_use]
    pub fn is_forbidden_splice_target(&self) -> bool {
        matches!(
            self,
            Self::BeginSwitchDefaultCase | Self::BeginElse | Self::BeginCatch | Self::BeginFinally
        )
    }

    /// True if `end` may close the block (part) most recently opened by
    /// `self`.
    #[must_use]
    pub fn is_matching_block_end(&self, end: &Self) -> bool {
        match end {
            Self::EndObjectLiteralMethod => matches!(self, Self::BeginObjectLiteralMethod { .. }),
            Self::EndObjectLiteral => matches!(self, Self::BeginObjectLiteral),
            Self::EndClassConstructor => matches!(self, Self::BeginClassConstructor { .. }),
            Self::EndClassInstanceMethod => matches!(self, Self::BeginClassInstanceMethod { .. }),
            Self::EndClassDefinition => matches!(self, Self::BeginClassDefinition { .. }),
            Self::EndPlainFunction => matches!(self, Self::BeginPlainFunction { .. }),
            Self::EndArrowFunction => matches!(self, Self::BeginArrowFunction { .. }),
            Self::EndGeneratorFunction => matches!(self, Self::BeginGeneratorFunction { .. }),
            Self::EndAsyncFunction => matches!(self, Self::BeginAsyncFunction { .. }),
            Self::BeginCatch => matches!(self, Self::BeginTry),
            Self::BeginFinally => matches!(self, Self::BeginTry | Self::BeginCatch),
            Self::EndTryCatchFinally => {
                matches!(self, Self::BeginTry | Self::BeginCatch | Self::BeginFinally)
            }
            Self::EndWhileLoop => matches!(self, Self::BeginWhileLoop { .. }),
            Self::EndDoWhileLoop => matches!(self, Self::BeginDoWhileLoop { .. }),
            Self::EndForLoop => matches!(self, Self::BeginForLoop { .. }),
            Self::EndForInLoop => matches!(self, Self::BeginForInLoop),
            Self::EndForOfLoop => matches!(self, Self::BeginForOfLoop),
            Self::BeginElse => matches!(self, Self::BeginIf { .. }),
            Self::EndIf => matches!(self, Self::BeginIf { .. } | Self::BeginElse),
            Self::EndSwitchCase => {
                matches!(self, Self::BeginSwitchCase | Self::BeginSwitchDefaultCase)
            }
            Self::EndSwitch => matches!(self, Self::BeginSwitch),
            _ => false,
        }
    }

    /// The builder-lifetime signature attached to subroutine definitions.
    #[must_use]
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Self::BeginObjectLiteralMethod { signature, .. }
            | Self::BeginClassConstructor { signature, .. }
            | Self::BeginClassInstanceMethod { signature, .. }
            | Self::BeginPlainFunction { signature, .. }
            | Self::BeginArrowFunction { signature, .. }
            | Self::BeginGeneratorFunction { signature, .. }
            | Self::BeginAsyncFunction { signature, .. } => signature.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arities() {
        assert_eq!(Operation::LoadInteger { value: 1 }.num_inputs(), 0);
        assert_eq!(Operation::LoadInteger { value: 1 }.num_outputs(), 1);
        assert_eq!(Operation::CallFunction { num_arguments: 3 }.num_inputs(), 4);
        assert_eq!(
            Operation::BeginPlainFunction { num_parameters: 2, signature: None }
                .num_inner_outputs(),
            2
        );
        assert_eq!(
            Operation::BeginClassConstructor { num_parameters: 2, signature: None }
                .num_inner_outputs(),
            3
        );
        assert_eq!(Operation::BeginForLoop {
            comparator: Comparator::LessThan,
            op: BinaryOperator::Add
        }
        .num_inputs(), 3);
    }

    #[test]
    fn block_matching() {
        let begin = Operation::BeginIf { inverted: false };
        assert!(begin.is_matching_block_end(&Operation::BeginElse));
        assert!(begin.is_matching_block_end(&Operation::EndIf));
        assert!(Operation::BeginElse.is_matching_block_end(&Operation::EndIf));
        assert!(!begin.is_matching_block_end(&Operation::EndWhileLoop));
        assert!(Operation::BeginTry.is_matching_block_end(&Operation::BeginCatch));
        assert!(Operation::BeginCatch.is_matching_block_end(&Operation::EndTryCatchFinally));
    }

    #[test]
    fn attribute_classification() {
        assert!(Operation::LoadInteger { value: 0 }.is_simple());
        assert!(Operation::Reassign.may_reassign());
        assert!(Operation::UnaryOperation { op: UnaryOperator::PreInc }.may_reassign());
        assert!(!Operation::UnaryOperation { op: UnaryOperator::LogicalNot }.may_reassign());
        assert!(Operation::CallMethod { name: "f".to_owned(), num_arguments: 0 }.is_call());
        assert!(Operation::BeginElse.is_block_continuation());
    }

    #[test]
    fn context_requirements() {
        assert_eq!(
            Operation::LoadInteger { value: 0 }.required_context(),
            Context::SCRIPT
        );
        assert!(
            Operation::Return
                .required_context()
                .contains(Context::SUBROUTINE)
        );
        assert!(
            Operation::BeginGeneratorFunction { num_parameters: 0, signature: None }
                .opened_context()
                .contains(Context::GENERATOR_FUNCTION)
        );
    }
}
