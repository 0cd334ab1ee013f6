//! Incremental program construction.
//!
//! [`ProgramBuilder`] is the only way programs come into existence: typed
//! constructors append one instruction each, block-structured operations are
//! exposed as callback-taking methods that guarantee matched begin/end pairs,
//! and the analyzers run on every append so that scope, context, and type
//! queries are always current.
//!
//! # Module Structure
//!
//! - `adoption` - copying instructions verbatim from another program
//! - `build_loop` - the budget-driven generate/splice dispatcher
//! - `splice` - extracting a dataflow slice from a donor program
//!
//! # Usage
//!
//! ```ignore
//! let mut b = ProgramBuilder::with_seed(42);
//! let zero = b.load_int(0);
//! let ten = b.load_int(10);
//! b.build_while_loop(zero, ten, Comparator::LessThan, |b| {
//!     let one = b.load_int(1);
//!     b.update(BinaryOperator::Add, zero, one);
//! });
//! let program = b.finalize()?;
//! ```

pub use build_loop::BuildMode;

use std::rc::Rc;

use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use smallvec::SmallVec;

use crate::{
    analysis::{ContextAnalyzer, ScopeAnalyzer, TypeAnalyzer},
    config::Config,
    environment::{Environment, INTERESTING_FLOATS, INTERESTING_INTEGERS},
    errors::BuilderError,
    generators::GeneratorLibrary,
    ir::{
        BinaryOperator, Code, Comparator, Context, Instruction, MAX_VARIABLES, Operation, Program,
        RegExpFlags, Signature, Type, UnaryOperator, Variable, VariableMap,
    },
};

mod adoption;
mod build_loop;
mod splice;

/// How strictly variable queries honor inferred types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuilderMode {
    /// Type queries return only statically matching variables; a miss is
    /// reported to the caller.
    #[default]
    Conservative,
    /// Type queries also admit unknown-typed variables and fall back to any
    /// visible variable on a miss.
    Aggressive,
}

/// Incrementally constructs an IR program while maintaining the scope,
/// context, and type invariants.
pub struct ProgramBuilder {
    env: Rc<Environment>,
    config: Rc<Config>,
    generators: Rc<GeneratorLibrary>,
    rng: ChaCha8Rng,

    code: Code,
    num_variables: usize,
    scopes: ScopeAnalyzer,
    contexts: ContextAnalyzer,
    types: TypeAnalyzer,
    mode: BuilderMode,

    /// Value-reuse maps for literal loads, keyed by defining variable.
    loaded_integers: VariableMap<i64>,
    /// Float values are stored as bit patterns so equality is exact.
    loaded_floats: VariableMap<u64>,
    loaded_builtins: VariableMap<String>,

    /// One frame per open adoption session.
    adoption_maps: Vec<VariableMap<Variable>>,

    /// Function variables whose definitions are currently open; the last one
    /// is excluded from conservative-mode call-target queries.
    open_subroutines: Vec<Variable>,

    /// Pre-sampled corpus programs serving as splice donors.
    donors: Vec<Rc<Program>>,

    /// Build-loop state stack; see `build_loop`.
    building_stack: Vec<build_loop::BuildingState>,

    contributors: Vec<&'static str>,
    comments: Vec<String>,
}

impl ProgramBuilder {
    /// Creates a builder with explicit collaborators. The RNG should be
    /// split off the owning fuzzer's RNG so that runs stay deterministic
    /// under seed.
    #[must_use]
    pub fn new(
        env: Rc<Environment>,
        config: Rc<Config>,
        generators: Rc<GeneratorLibrary>,
        rng: ChaCha8Rng,
    ) -> Self {
        let types = TypeAnalyzer::new(Rc::clone(&env));
        Self {
            env,
            config,
            generators,
            rng,
            code: Code::new(),
            num_variables: 0,
            scopes: ScopeAnalyzer::new(),
            contexts: ContextAnalyzer::new(),
            types,
            mode: BuilderMode::default(),
            loaded_integers: VariableMap::new(),
            loaded_floats: VariableMap::new(),
            loaded_builtins: VariableMap::new(),
            adoption_maps: Vec::new(),
            open_subroutines: Vec::new(),
            donors: Vec::new(),
            building_stack: Vec::new(),
            contributors: Vec::new(),
            comments: Vec::new(),
        }
    }

    /// Creates a standalone builder with default collaborators. Mainly for
    /// tests and examples.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::new(
            Rc::new(Environment::javascript()),
            Rc::new(Config::default()),
            Rc::new(GeneratorLibrary::default()),
            ChaCha8Rng::seed_from_u64(seed),
        )
    }

    // === State queries ===

    /// Number of instructions appended so far.
    #[must_use]
    pub fn current_size(&self) -> usize {
        self.code.len()
    }

    /// Number of variables allocated so far.
    #[must_use]
    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    /// The context active at the current program point.
    #[must_use]
    pub fn context(&self) -> Context {
        self.contexts.current()
    }

    /// All visible variables, in definition order.
    #[must_use]
    pub fn visible_variables(&self) -> &[Variable] {
        self.scopes.visible_variables()
    }

    /// True if at least one variable is visible.
    #[must_use]
    pub fn has_visible_variables(&self) -> bool {
        !self.scopes.visible_variables().is_empty()
    }

    /// The inferred type of a variable.
    #[must_use]
    pub fn type_of(&self, v: Variable) -> Type {
        self.types.type_of(v)
    }

    /// The fuzzer-wide type of a property.
    #[must_use]
    pub fn type_of_property(&self, name: &str) -> Type {
        self.env.type_of_property(name)
    }

    /// The signature to assume when calling `name` on `receiver`.
    #[must_use]
    pub fn method_signature(&self, name: &str, receiver: Variable) -> Signature {
        self.env.method_signature(name, &self.type_of(receiver))
    }

    /// The environment this builder constructs programs for.
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// The active query mode.
    #[must_use]
    pub fn mode(&self) -> BuilderMode {
        self.mode
    }

    /// Sets the query mode. Saved and restored around recursive sub-builds.
    pub fn set_mode(&mut self, mode: BuilderMode) {
        self.mode = mode;
    }

    /// Registers a corpus program as a splice donor.
    pub fn add_splice_donor(&mut self, donor: Rc<Program>) {
        self.donors.push(donor);
    }

    /// One of the registered splice donors, if any.
    pub fn rand_donor(&mut self) -> Option<Rc<Program>> {
        if self.donors.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..self.donors.len());
        Some(Rc::clone(&self.donors[index]))
    }

    /// Records a contributing generator or mutator for statistics.
    pub fn record_contributor(&mut self, name: &'static str) {
        if !self.contributors.contains(&name) {
            self.contributors.push(name);
        }
    }

    /// Attaches a comment to the eventual program.
    pub fn add_comment(&mut self, comment: impl Into<String>) {
        self.comments.push(comment.into());
    }

    // === Core append machinery ===

    fn next_variable(&mut self) -> Variable {
        assert!(
            self.num_variables < MAX_VARIABLES,
            "program exceeded the variable limit"
        );
        let v = Variable::new(self.num_variables);
        self.num_variables += 1;
        v
    }

    /// Appends a fully-formed instruction and feeds the analyzers. All
    /// construction funnels through here.
    pub(crate) fn internal_append(&mut self, instr: Instruction) {
        #[cfg(debug_assertions)]
        {
            for &input in instr.inputs() {
                debug_assert!(
                    self.scopes.is_visible(input),
                    "input {input} of {} is not in scope",
                    instr.op().name()
                );
            }
            debug_assert!(
                self.contexts.current().contains(instr.op().required_context()),
                "context requirement of {} is not met",
                instr.op().name()
            );
        }

        if let Some(reassigned) = instr.reassigned_variable() {
            self.loaded_integers.remove(reassigned);
            self.loaded_floats.remove(reassigned);
            self.loaded_builtins.remove(reassigned);
        }

        match instr.op() {
            Operation::BeginPlainFunction { .. }
            | Operation::BeginArrowFunction { .. }
            | Operation::BeginGeneratorFunction { .. }
            | Operation::BeginAsyncFunction { .. } => {
                self.open_subroutines.push(instr.output());
            }
            Operation::EndPlainFunction
            | Operation::EndArrowFunction
            | Operation::EndGeneratorFunction
            | Operation::EndAsyncFunction => {
                self.open_subroutines.pop();
            }
            _ => {}
        }

        self.scopes.analyze(&instr);
        self.contexts.analyze(&instr);
        self.types.analyze(&instr);
        self.code.append(instr);
    }

    /// Appends `op` with the given inputs, allocating fresh output and inner
    /// output variables. Returns the allocated variables, outer first.
    pub(crate) fn emit(
        &mut self,
        op: Operation,
        inputs: &[Variable],
    ) -> SmallVec<[Variable; 4]> {
        debug_assert_eq!(inputs.len(), op.num_inputs(), "arity mismatch for {}", op.name());
        let num_new = op.num_outputs() + op.num_inner_outputs();
        let mut inouts: SmallVec<[Variable; 4]> = SmallVec::from_slice(inputs);
        let mut allocated = SmallVec::new();
        for _ in 0..num_new {
            let v = self.next_variable();
            inouts.push(v);
            allocated.push(v);
        }
        self.internal_append(Instruction::new(op, inouts));
        allocated
    }

    fn emit_single(&mut self, op: Operation, inputs: &[Variable]) -> Variable {
        self.emit(op, inputs)[0]
    }

    // === Literal constructors ===

    pub fn load_int(&mut self, value: i64) -> Variable {
        let v = self.emit_single(Operation::LoadInteger { value }, &[]);
        self.loaded_integers.insert(v, value);
        v
    }

    pub fn load_big_int(&mut self, value: i64) -> Variable {
        self.emit_single(Operation::LoadBigInt { value }, &[])
    }

    pub fn load_float(&mut self, value: f64) -> Variable {
        let v = self.emit_single(Operation::LoadFloat { value }, &[]);
        self.loaded_floats.insert(v, value.to_bits());
        v
    }

    pub fn load_string(&mut self, value: impl Into<String>) -> Variable {
        self.emit_single(Operation::LoadString { value: value.into() }, &[])
    }

    pub fn load_bool(&mut self, value: bool) -> Variable {
        self.emit_single(Operation::LoadBoolean { value }, &[])
    }

    pub fn load_undefined(&mut self) -> Variable {
        self.emit_single(Operation::LoadUndefined, &[])
    }

    pub fn load_null(&mut self) -> Variable {
        self.emit_single(Operation::LoadNull, &[])
    }

    pub fn load_reg_exp(&mut self, pattern: impl Into<String>, flags: RegExpFlags) -> Variable {
        self.emit_single(Operation::LoadRegExp { pattern: pattern.into(), flags }, &[])
    }

    pub fn load_builtin(&mut self, name: impl Into<String>) -> Variable {
        let name = name.into();
        let v = self.emit_single(Operation::LoadBuiltin { name: name.clone() }, &[]);
        self.loaded_builtins.insert(v, name);
        v
    }

    pub fn load_arguments(&mut self) -> Variable {
        self.emit_single(Operation::LoadArguments, &[])
    }

    // === Value reuse ===

    /// Returns a visible variable already holding `value`, or loads it.
    pub fn reuse_or_load_int(&mut self, value: i64) -> Variable {
        let existing = self
            .loaded_integers
            .iter()
            .filter(|&(ref v, &val)| val == value && self.scopes.is_visible(*v))
            .map(|(v, _)| v)
            .last();
        existing.unwrap_or_else(|| self.load_int(value))
    }

    /// Returns a visible variable already holding `value`, or loads it. The
    /// comparison is on bit patterns, so NaN payloads must match exactly.
    pub fn reuse_or_load_float(&mut self, value: f64) -> Variable {
        let bits = value.to_bits();
        let existing = self
            .loaded_floats
            .iter()
            .filter(|&(ref v, &val)| val == bits && self.scopes.is_visible(*v))
            .map(|(v, _)| v)
            .last();
        existing.unwrap_or_else(|| self.load_float(value))
    }

    /// Returns a visible variable already holding the named builtin, or
    /// loads it.
    pub fn reuse_or_load_builtin(&mut self, name: &str) -> Variable {
        let existing = self
            .loaded_builtins
            .iter()
            .filter(|(v, val)| val.as_str() == name && self.scopes.is_visible(*v))
            .map(|(v, _)| v)
            .last();
        existing.unwrap_or_else(|| self.load_builtin(name))
    }

    // === Arrays ===

    pub fn create_array(&mut self, initial_values: &[Variable]) -> Variable {
        let op = Operation::CreateArray {
            num_initial_values: initial_values.len() as u16,
        };
        self.emit_single(op, initial_values)
    }

    pub fn create_array_with_spread(
        &mut self,
        initial_values: &[Variable],
        spreads: Vec<bool>,
    ) -> Variable {
        debug_assert_eq!(initial_values.len(), spreads.len());
        self.emit_single(Operation::CreateArrayWithSpread { spreads }, initial_values)
    }

    pub fn create_int_array(&mut self, values: Vec<i64>) -> Variable {
        self.emit_single(Operation::CreateIntArray { values }, &[])
    }

    pub fn create_float_array(&mut self, values: Vec<f64>) -> Variable {
        self.emit_single(Operation::CreateFloatArray { values }, &[])
    }

    // === Operators ===

    pub fn unary(&mut self, op: UnaryOperator, input: Variable) -> Variable {
        self.emit_single(Operation::UnaryOperation { op }, &[input])
    }

    pub fn binary(&mut self, op: BinaryOperator, lhs: Variable, rhs: Variable) -> Variable {
        self.emit_single(Operation::BinaryOperation { op }, &[lhs, rhs])
    }

    pub fn ternary(&mut self, condition: Variable, a: Variable, b: Variable) -> Variable {
        self.emit_single(Operation::TernaryOperation, &[condition, a, b])
    }

    /// `target op= value`.
    pub fn update(&mut self, op: BinaryOperator, target: Variable, value: Variable) {
        self.emit(Operation::Update { op }, &[target, value]);
    }

    pub fn dup(&mut self, v: Variable) -> Variable {
        self.emit_single(Operation::Dup, &[v])
    }

    pub fn reassign(&mut self, target: Variable, source: Variable) {
        self.emit(Operation::Reassign, &[target, source]);
    }

    pub fn compare(&mut self, op: Comparator, lhs: Variable, rhs: Variable) -> Variable {
        self.emit_single(Operation::Compare { op }, &[lhs, rhs])
    }

    pub fn type_of_value(&mut self, v: Variable) -> Variable {
        self.emit_single(Operation::TypeOf, &[v])
    }

    pub fn test_instance_of(&mut self, v: Variable, constructor: Variable) -> Variable {
        self.emit_single(Operation::TestInstanceOf, &[v, constructor])
    }

    pub fn test_in(&mut self, key: Variable, object: Variable) -> Variable {
        self.emit_single(Operation::TestIn, &[key, object])
    }

    // === Property and element traffic ===

    pub fn get_property(&mut self, object: Variable, name: impl Into<String>) -> Variable {
        self.emit_single(Operation::GetProperty { name: name.into() }, &[object])
    }

    pub fn set_property(&mut self, object: Variable, name: impl Into<String>, value: Variable) {
        self.emit(Operation::SetProperty { name: name.into() }, &[object, value]);
    }

    pub fn delete_property(&mut self, object: Variable, name: impl Into<String>) -> Variable {
        self.emit_single(Operation::DeleteProperty { name: name.into() }, &[object])
    }

    pub fn get_element(&mut self, object: Variable, index: i64) -> Variable {
        self.emit_single(Operation::GetElement { index }, &[object])
    }

    pub fn set_element(&mut self, object: Variable, index: i64, value: Variable) {
        self.emit(Operation::SetElement { index }, &[object, value]);
    }

    pub fn get_computed_property(&mut self, object: Variable, key: Variable) -> Variable {
        self.emit_single(Operation::GetComputedProperty, &[object, key])
    }

    pub fn set_computed_property(&mut self, object: Variable, key: Variable, value: Variable) {
        self.emit(Operation::SetComputedProperty, &[object, key, value]);
    }

    // === Calls ===

    pub fn call_function(&mut self, function: Variable, args: &[Variable]) -> Variable {
        let mut inputs = Vec::with_capacity(1 + args.len());
        inputs.push(function);
        inputs.extend_from_slice(args);
        self.emit_single(
            Operation::CallFunction { num_arguments: args.len() as u16 },
            &inputs,
        )
    }

    pub fn construct(&mut self, constructor: Variable, args: &[Variable]) -> Variable {
        let mut inputs = Vec::with_capacity(1 + args.len());
        inputs.push(constructor);
        inputs.extend_from_slice(args);
        self.emit_single(Operation::Construct { num_arguments: args.len() as u16 }, &inputs)
    }

    pub fn call_method(
        &mut self,
        object: Variable,
        name: impl Into<String>,
        args: &[Variable],
    ) -> Variable {
        let mut inputs = Vec::with_capacity(1 + args.len());
        inputs.push(object);
        inputs.extend_from_slice(args);
        self.emit_single(
            Operation::CallMethod { name: name.into(), num_arguments: args.len() as u16 },
            &inputs,
        )
    }

    pub fn call_computed_method(
        &mut self,
        object: Variable,
        key: Variable,
        args: &[Variable],
    ) -> Variable {
        let mut inputs = Vec::with_capacity(2 + args.len());
        inputs.push(object);
        inputs.push(key);
        inputs.extend_from_slice(args);
        self.emit_single(
            Operation::CallComputedMethod { num_arguments: args.len() as u16 },
            &inputs,
        )
    }

    // === Statements ===

    pub fn return_value(&mut self, v: Variable) {
        self.emit(Operation::Return, &[v]);
    }

    pub fn yield_value(&mut self, v: Variable) -> Variable {
        self.emit_single(Operation::Yield, &[v])
    }

    pub fn await_value(&mut self, v: Variable) -> Variable {
        self.emit_single(Operation::Await, &[v])
    }

    pub fn throw_exception(&mut self, v: Variable) {
        self.emit(Operation::ThrowException, &[v]);
    }

    pub fn loop_break(&mut self) {
        self.emit(Operation::LoopBreak, &[]);
    }

    pub fn loop_continue(&mut self) {
        self.emit(Operation::LoopContinue, &[]);
    }

    pub fn nop(&mut self) {
        self.emit(Operation::Nop, &[]);
    }

    // === Block builders ===
    //
    // Each takes the block body as a closure, so the matching end is emitted
    // on every exit path and the callback sees the inner outputs.

    fn build_subroutine(
        &mut self,
        begin: Operation,
        end: Operation,
        body: impl FnOnce(&mut Self, &[Variable]),
    ) -> Variable {
        let vars = self.emit(begin, &[]);
        let function = vars[0];
        let params = vars[1..].to_vec();
        body(self, &params);
        self.emit(end, &[]);
        function
    }

    /// Defines a plain function; returns the function variable. The body
    /// callback receives the parameter variables.
    pub fn build_plain_function(
        &mut self,
        num_parameters: u16,
        signature: Option<Signature>,
        body: impl FnOnce(&mut Self, &[Variable]),
    ) -> Variable {
        self.build_subroutine(
            Operation::BeginPlainFunction { num_parameters, signature },
            Operation::EndPlainFunction,
            body,
        )
    }

    pub fn build_arrow_function(
        &mut self,
        num_parameters: u16,
        signature: Option<Signature>,
        body: impl FnOnce(&mut Self, &[Variable]),
    ) -> Variable {
        self.build_subroutine(
            Operation::BeginArrowFunction { num_parameters, signature },
            Operation::EndArrowFunction,
            body,
        )
    }

    pub fn build_generator_function(
        &mut self,
        num_parameters: u16,
        signature: Option<Signature>,
        body: impl FnOnce(&mut Self, &[Variable]),
    ) -> Variable {
        self.build_subroutine(
            Operation::BeginGeneratorFunction { num_parameters, signature },
            Operation::EndGeneratorFunction,
            body,
        )
    }

    pub fn build_async_function(
        &mut self,
        num_parameters: u16,
        signature: Option<Signature>,
        body: impl FnOnce(&mut Self, &[Variable]),
    ) -> Variable {
        self.build_subroutine(
            Operation::BeginAsyncFunction { num_parameters, signature },
            Operation::EndAsyncFunction,
            body,
        )
    }

    /// `while (lhs <comparator> rhs) { body }`.
    pub fn build_while_loop(
        &mut self,
        lhs: Variable,
        rhs: Variable,
        comparator: Comparator,
        body: impl FnOnce(&mut Self),
    ) {
        self.emit(Operation::BeginWhileLoop { comparator }, &[lhs, rhs]);
        body(self);
        self.emit(Operation::EndWhileLoop, &[]);
    }

    pub fn build_do_while_loop(
        &mut self,
        lhs: Variable,
        rhs: Variable,
        comparator: Comparator,
        body: impl FnOnce(&mut Self),
    ) {
        self.emit(Operation::BeginDoWhileLoop { comparator }, &[lhs, rhs]);
        body(self);
        self.emit(Operation::EndDoWhileLoop, &[]);
    }

    /// `for (i = start; i <comparator> end; i <op>= step) { body }`. The
    /// body callback receives the induction variable.
    pub fn build_for_loop(
        &mut self,
        start: Variable,
        end: Variable,
        step: Variable,
        comparator: Comparator,
        op: BinaryOperator,
        body: impl FnOnce(&mut Self, Variable),
    ) {
        let vars = self.emit(Operation::BeginForLoop { comparator, op }, &[start, end, step]);
        body(self, vars[0]);
        self.emit(Operation::EndForLoop, &[]);
    }

    pub fn build_for_in_loop(&mut self, object: Variable, body: impl FnOnce(&mut Self, Variable)) {
        let vars = self.emit(Operation::BeginForInLoop, &[object]);
        body(self, vars[0]);
        self.emit(Operation::EndForInLoop, &[]);
    }

    pub fn build_for_of_loop(&mut self, object: Variable, body: impl FnOnce(&mut Self, Variable)) {
        let vars = self.emit(Operation::BeginForOfLoop, &[object]);
        body(self, vars[0]);
        self.emit(Operation::EndForOfLoop, &[]);
    }

    pub fn build_if(&mut self, condition: Variable, then_body: impl FnOnce(&mut Self)) {
        self.emit(Operation::BeginIf { inverted: false }, &[condition]);
        then_body(self);
        self.emit(Operation::EndIf, &[]);
    }

    pub fn build_if_else(
        &mut self,
        condition: Variable,
        then_body: impl FnOnce(&mut Self),
        else_body: impl FnOnce(&mut Self),
    ) {
        self.emit(Operation::BeginIf { inverted: false }, &[condition]);
        then_body(self);
        self.emit(Operation::BeginElse, &[]);
        else_body(self);
        self.emit(Operation::EndIf, &[]);
    }

    /// `try { .. } catch (e) { .. }`. The catch callback receives the caught
    /// exception.
    pub fn build_try_catch(
        &mut self,
        try_body: impl FnOnce(&mut Self),
        catch_body: impl FnOnce(&mut Self, Variable),
    ) {
        self.emit(Operation::BeginTry, &[]);
        try_body(self);
        let vars = self.emit(Operation::BeginCatch, &[]);
        catch_body(self, vars[0]);
        self.emit(Operation::EndTryCatchFinally, &[]);
    }

    pub fn build_try_finally(
        &mut self,
        try_body: impl FnOnce(&mut Self),
        finally_body: impl FnOnce(&mut Self),
    ) {
        self.emit(Operation::BeginTry, &[]);
        try_body(self);
        self.emit(Operation::BeginFinally, &[]);
        finally_body(self);
        self.emit(Operation::EndTryCatchFinally, &[]);
    }

    pub fn build_try_catch_finally(
        &mut self,
        try_body: impl FnOnce(&mut Self),
        catch_body: impl FnOnce(&mut Self, Variable),
        finally_body: impl FnOnce(&mut Self),
    ) {
        self.emit(Operation::BeginTry, &[]);
        try_body(self);
        let vars = self.emit(Operation::BeginCatch, &[]);
        catch_body(self, vars[0]);
        self.emit(Operation::BeginFinally, &[]);
        finally_body(self);
        self.emit(Operation::EndTryCatchFinally, &[]);
    }

    /// Builds an object literal; returns the object variable.
    pub fn build_object_literal(
        &mut self,
        body: impl FnOnce(&mut ObjectLiteralBuilder<'_>),
    ) -> Variable {
        self.emit(Operation::BeginObjectLiteral, &[]);
        body(&mut ObjectLiteralBuilder { b: self });
        self.emit_single(Operation::EndObjectLiteral, &[])
    }

    /// Builds a class definition; returns the class variable.
    pub fn build_class_definition(
        &mut self,
        superclass: Option<Variable>,
        body: impl FnOnce(&mut ClassDefinitionBuilder<'_>),
    ) -> Variable {
        let inputs: SmallVec<[Variable; 1]> = superclass.into_iter().collect();
        let class = self.emit(
            Operation::BeginClassDefinition { has_superclass: superclass.is_some() },
            &inputs,
        )[0];
        body(&mut ClassDefinitionBuilder { b: self });
        self.emit(Operation::EndClassDefinition, &[]);
        class
    }

    /// Builds a switch over `on`.
    pub fn build_switch(&mut self, on: Variable, body: impl FnOnce(&mut SwitchBuilder<'_>)) {
        self.emit(Operation::BeginSwitch, &[on]);
        body(&mut SwitchBuilder { b: self });
        self.emit(Operation::EndSwitch, &[]);
    }

    // === Random value helpers ===

    pub(crate) fn probability(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }

    pub(crate) fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// A random integer, biased toward interesting boundary values.
    pub fn rand_int(&mut self) -> i64 {
        if self.probability(0.5) {
            *INTERESTING_INTEGERS
                .choose(&mut self.rng)
                .expect("the interesting integer table is not empty")
        } else {
            self.rng.gen_range(-0x1_0000_0000i64..=0x1_0000_0000i64)
        }
    }

    /// A random float, biased toward interesting boundary values.
    pub fn rand_float(&mut self) -> f64 {
        if self.probability(0.5) {
            *INTERESTING_FLOATS
                .choose(&mut self.rng)
                .expect("the interesting float table is not empty")
        } else {
            self.rng.gen_range(-1.0e9..1.0e9)
        }
    }

    /// A random short string: a property name, a builtin name, a number, or
    /// plain ASCII noise.
    pub fn rand_string(&mut self) -> String {
        match self.rng.gen_range(0..4u8) {
            0 => {
                let names = self.env.custom_property_names();
                (*names.choose(&mut self.rng).expect("property pool is not empty")).to_owned()
            }
            1 => self.rand_builtin(),
            2 => self.rand_int().to_string(),
            _ => {
                let len = self.rng.gen_range(1..=8);
                (0..len)
                    .map(|_| char::from(self.rng.gen_range(b'a'..=b'z')))
                    .collect()
            }
        }
    }

    /// A random regular expression pattern assembled from a few stock
    /// pieces.
    pub fn rand_reg_exp_pattern(&mut self) -> String {
        const PIECES: [&str; 10] =
            ["a", "b|c", "[0-9]", "[^a-z]", "\\w+", "\\d*", "(x)", "a{1,3}", "^s", "e$"];
        let n = self.rng.gen_range(1..=3);
        let mut pattern = String::new();
        for _ in 0..n {
            pattern.push_str(PIECES.choose(&mut self.rng).expect("pattern pool is not empty"));
        }
        pattern
    }

    /// The name of a random environment builtin.
    pub fn rand_builtin(&mut self) -> String {
        let index = self.rng.gen_range(0..self.env.num_builtins());
        self.env.builtin_name(index).to_owned()
    }

    /// A property name suitable for reading from `object`, preferring
    /// properties its inferred type is known to have.
    pub fn rand_property_for_reading(&mut self, object: Variable) -> String {
        let t = self.type_of(object);
        if !t.properties().is_empty() && self.probability(0.8) {
            let index = self.rng.gen_range(0..t.properties().len());
            return t.properties()[index].clone();
        }
        let names = self.env.read_property_names();
        (*names.choose(&mut self.rng).expect("property pool is not empty")).to_owned()
    }

    /// A property name suitable for writing on `object`.
    pub fn rand_property_for_writing(&mut self, object: Variable) -> String {
        let t = self.type_of(object);
        if !t.properties().is_empty() && self.probability(0.5) {
            let index = self.rng.gen_range(0..t.properties().len());
            return t.properties()[index].clone();
        }
        let names = self.env.write_property_names();
        (*names.choose(&mut self.rng).expect("property pool is not empty")).to_owned()
    }

    /// A short name for defining a fresh property.
    pub fn rand_property_for_defining(&mut self) -> String {
        let names = self.env.custom_property_names();
        (*names.choose(&mut self.rng).expect("property pool is not empty")).to_owned()
    }

    /// A method name plausible for `object`.
    pub fn rand_method(&mut self, object: Variable) -> String {
        let t = self.type_of(object);
        if !t.methods().is_empty() && self.probability(0.8) {
            let index = self.rng.gen_range(0..t.methods().len());
            return t.methods()[index].clone();
        }
        let names = self.env.method_names();
        (*names.choose(&mut self.rng).expect("method pool is not empty")).to_owned()
    }

    /// Any visible variable.
    pub fn rand_var(&mut self) -> Option<Variable> {
        let visible = self.scopes.visible_variables();
        if visible.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..visible.len());
        Some(visible[index])
    }

    /// A visible variable whose inferred type matches `wanted`.
    ///
    /// In conservative mode only statically matching variables are returned
    /// and a miss yields `None`. In aggressive mode unknown-typed variables
    /// are admitted and, on a miss, any visible variable is returned; with
    /// at least one visible variable this never comes back empty.
    pub fn rand_var_of_type(&mut self, wanted: &Type) -> Option<Variable> {
        let aggressive = self.mode == BuilderMode::Aggressive;
        let matching: Vec<Variable> = self
            .scopes
            .visible_variables()
            .iter()
            .copied()
            .filter(|&v| {
                let t = self.types.type_of(v);
                t.is(wanted) || (aggressive && t.is_unknown())
            })
            .collect();
        if matching.is_empty() {
            if aggressive {
                return self.rand_var();
            }
            return None;
        }
        let index = self.rng.gen_range(0..matching.len());
        Some(matching[index])
    }

    /// Up to `n` distinct visible variables.
    pub fn rand_vars(&mut self, up_to: usize) -> Vec<Variable> {
        let mut pool: Vec<Variable> = self.scopes.visible_variables().to_vec();
        pool.shuffle(&mut self.rng);
        pool.truncate(up_to);
        pool
    }

    /// A visible callable, excluding the function currently being defined
    /// while in conservative mode.
    pub fn rand_callable(&mut self) -> Option<Variable> {
        let current = self.open_subroutines.last().copied();
        let exclude_current = self.mode == BuilderMode::Conservative;
        let matching: Vec<Variable> = self
            .scopes
            .visible_variables()
            .iter()
            .copied()
            .filter(|&v| self.types.type_of(v).is_callable())
            .filter(|&v| !(exclude_current && Some(v) == current))
            .collect();
        if matching.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..matching.len());
        Some(matching[index])
    }

    /// Finds or fabricates arguments fitting the given signature.
    pub fn rand_arguments_for(&mut self, signature: &Signature) -> Vec<Variable> {
        let mut args = Vec::with_capacity(signature.parameters.len());
        for param in signature.parameters.clone() {
            let t = param.parameter_type().clone();
            let arg = self
                .rand_var_of_type(&t)
                .unwrap_or_else(|| self.generate_variable_of_type(&t));
            args.push(arg);
        }
        args
    }

    /// Emits a literal of (roughly) the requested type and returns it. The
    /// fallback when no fitting variable exists.
    pub fn generate_variable_of_type(&mut self, t: &Type) -> Variable {
        if t.is(&Type::integer()) {
            let value = self.rand_int();
            self.load_int(value)
        } else if t.is(&Type::float()) || t.is(&Type::number()) {
            let value = self.rand_float();
            self.load_float(value)
        } else if t.is(&Type::string()) {
            let value = self.rand_string();
            self.load_string(value)
        } else if t.is(&Type::boolean()) {
            let value = self.probability(0.5);
            self.load_bool(value)
        } else if t.is(&Type::big_int()) {
            let value = self.rand_int();
            self.load_big_int(value)
        } else if t.is(&Type::reg_exp()) {
            let pattern = self.rand_reg_exp_pattern();
            self.load_reg_exp(pattern, RegExpFlags::empty())
        } else if t.is_object() {
            self.create_array(&[])
        } else {
            self.load_undefined()
        }
    }

    // === Finalization ===

    /// Finishes construction and returns the immutable program.
    ///
    /// Fails if a block or adoption session is still open. In debug builds
    /// the full invariant check runs on the result.
    pub fn finalize(&mut self) -> Result<Program, BuilderError> {
        if !self.adoption_maps.is_empty() {
            return Err(BuilderError::OpenAdoptionSession);
        }
        if self.scopes.depth() != 1 {
            return Err(BuilderError::UnterminatedBlock { index: self.code.len() });
        }
        #[cfg(debug_assertions)]
        self.code.check()?;

        let code = std::mem::take(&mut self.code);
        let mut program = Program::new(code);
        for comment in self.comments.drain(..) {
            program.add_comment(comment);
        }
        for contributor in self.contributors.drain(..) {
            program.record_contributor(contributor);
        }
        self.reset();
        Ok(program)
    }

    /// Discards all state and starts over with an empty program.
    pub fn reset(&mut self) {
        self.code.remove_all();
        self.num_variables = 0;
        self.scopes = ScopeAnalyzer::new();
        self.contexts = ContextAnalyzer::new();
        self.types = TypeAnalyzer::new(Rc::clone(&self.env));
        self.loaded_integers = VariableMap::new();
        self.loaded_floats = VariableMap::new();
        self.loaded_builtins = VariableMap::new();
        self.adoption_maps.clear();
        self.open_subroutines.clear();
        self.building_stack.clear();
        self.contributors.clear();
        self.comments.clear();
    }
}

/// Scoped helper for the interior of an object literal.
pub struct ObjectLiteralBuilder<'a> {
    b: &'a mut ProgramBuilder,
}

impl ObjectLiteralBuilder<'_> {
    pub fn add_property(&mut self, name: impl Into<String>, value: Variable) {
        self.b
            .emit(Operation::ObjectLiteralAddProperty { name: name.into() }, &[value]);
    }

    /// Spreads the properties of an existing object into the literal.
    pub fn copy_properties(&mut self, object: Variable) {
        self.b.emit(Operation::ObjectLiteralCopyProperties, &[object]);
    }

    pub fn add_method(
        &mut self,
        name: impl Into<String>,
        num_parameters: u16,
        body: impl FnOnce(&mut ProgramBuilder, &[Variable]),
    ) {
        let vars = self.b.emit(
            Operation::BeginObjectLiteralMethod {
                name: name.into(),
                num_parameters,
                signature: None,
            },
            &[],
        );
        body(self.b, &vars);
        self.b.emit(Operation::EndObjectLiteralMethod, &[]);
    }
}

/// Scoped helper for the interior of a class definition.
pub struct ClassDefinitionBuilder<'a> {
    b: &'a mut ProgramBuilder,
}

impl ClassDefinitionBuilder<'_> {
    pub fn add_instance_property(&mut self, name: impl Into<String>, value: Option<Variable>) {
        let inputs: SmallVec<[Variable; 1]> = value.into_iter().collect();
        self.b.emit(
            Operation::ClassAddInstanceProperty {
                name: name.into(),
                has_value: !inputs.is_empty(),
            },
            &inputs,
        );
    }

    /// Adds the constructor. The body callback receives `this` followed by
    /// the parameters.
    pub fn add_constructor(
        &mut self,
        num_parameters: u16,
        body: impl FnOnce(&mut ProgramBuilder, &[Variable]),
    ) {
        let vars = self.b.emit(
            Operation::BeginClassConstructor { num_parameters, signature: None },
            &[],
        );
        body(self.b, &vars);
        self.b.emit(Operation::EndClassConstructor, &[]);
    }

    /// Adds an instance method. The body callback receives `this` followed
    /// by the parameters.
    pub fn add_instance_method(
        &mut self,
        name: impl Into<String>,
        num_parameters: u16,
        body: impl FnOnce(&mut ProgramBuilder, &[Variable]),
    ) {
        let vars = self.b.emit(
            Operation::BeginClassInstanceMethod {
                name: name.into(),
                num_parameters,
                signature: None,
            },
            &[],
        );
        body(self.b, &vars);
        self.b.emit(Operation::EndClassInstanceMethod, &[]);
    }
}

/// Scoped helper for the interior of a switch.
pub struct SwitchBuilder<'a> {
    b: &'a mut ProgramBuilder,
}

impl SwitchBuilder<'_> {
    /// Adds a `case value:` block.
    pub fn add_case(&mut self, value: Variable, body: impl FnOnce(&mut ProgramBuilder)) {
        self.b.emit(Operation::BeginSwitchCase, &[value]);
        body(self.b);
        self.b.emit(Operation::EndSwitchCase, &[]);
    }

    /// Adds the `default:` block.
    pub fn add_default(&mut self, body: impl FnOnce(&mut ProgramBuilder)) {
        self.b.emit(Operation::BeginSwitchDefaultCase, &[]);
        body(self.b);
        self.b.emit(Operation::EndSwitchCase, &[]);
    }
}
