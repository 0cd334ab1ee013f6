//! Light type inference.
//!
//! A single forward pass assigns each variable a best-effort type. The
//! results are hints for variable queries, nothing more: reassignments
//! overwrite, conditional blocks widen, and anything the pass cannot see
//! becomes `unknown`. Consumers must tolerate imprecision.

use std::rc::Rc;

use ahash::AHashMap;

use crate::{
    environment::Environment,
    ir::{BinaryOperator, Instruction, Operation, Signature, Type, UnaryOperator, Variable},
};

/// Property and method names collected for an object literal or class body
/// that is still open.
#[derive(Debug, Default)]
struct ShapeUnderConstruction {
    properties: Vec<String>,
    methods: Vec<String>,
}

/// Infers types over an instruction stream.
pub struct TypeAnalyzer {
    env: Rc<Environment>,
    /// Type per variable number.
    types: Vec<Type>,
    /// Block depth at which each variable was defined.
    def_depth: Vec<usize>,
    depth: usize,
    /// One frame per open block: the pre-block types of outer variables that
    /// were retyped inside it. On block exit the old and new types merge, so
    /// state changed on a conditional path only widens.
    change_frames: Vec<AHashMap<usize, Type>>,
    object_literals: Vec<ShapeUnderConstruction>,
    class_definitions: Vec<ShapeUnderConstruction>,
}

impl TypeAnalyzer {
    #[must_use]
    pub fn new(env: Rc<Environment>) -> Self {
        Self {
            env,
            types: Vec::new(),
            def_depth: Vec::new(),
            depth: 0,
            change_frames: Vec::new(),
            object_literals: Vec::new(),
            class_definitions: Vec::new(),
        }
    }

    /// The inferred type of a variable.
    #[must_use]
    pub fn type_of(&self, v: Variable) -> Type {
        self.types.get(v.number()).cloned().unwrap_or_else(Type::unknown)
    }

    /// The environment used to resolve builtins, properties, and methods.
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Consumes the next instruction.
    pub fn analyze(&mut self, instr: &Instruction) {
        if instr.is_block_end() {
            self.exit_block(instr.op());
        }

        let output_type = self.infer_output_type(instr);
        if let Some(&output) = instr.outputs().first() {
            self.define(output, output_type);
        }
        self.apply_side_effects(instr);

        if instr.is_block_begin() {
            self.enter_block(instr.op());
            for (i, &inner) in instr.inner_outputs().iter().enumerate() {
                let t = self.infer_inner_output_type(instr.op(), i);
                self.define(inner, t);
            }
        }
    }

    fn enter_block(&mut self, op: &Operation) {
        self.depth += 1;
        self.change_frames.push(AHashMap::new());
        match op {
            Operation::BeginObjectLiteral => {
                self.object_literals.push(ShapeUnderConstruction::default());
            }
            Operation::BeginClassDefinition { .. } => {
                self.class_definitions.push(ShapeUnderConstruction::default());
            }
            _ => {}
        }
    }

    fn exit_block(&mut self, op: &Operation) {
        if matches!(op, Operation::EndClassDefinition) {
            self.class_definitions.pop();
        }
        self.depth -= 1;
        let frame = self
            .change_frames
            .pop()
            .expect("block ends are matched before analysis");
        for (number, old) in frame {
            let merged = old.uniting(&self.types[number]);
            self.types[number] = merged;
        }
    }

    fn define(&mut self, v: Variable, t: Type) {
        let number = v.number();
        if number >= self.types.len() {
            self.types.resize(number + 1, Type::unknown());
            self.def_depth.resize(number + 1, 0);
        }
        self.types[number] = t;
        self.def_depth[number] = self.depth;
    }

    /// Overwrites the type of an already-defined variable, recording the old
    /// type for widening if the variable outlives the current block.
    fn retype(&mut self, v: Variable, t: Type) {
        let number = v.number();
        if number >= self.types.len() {
            return;
        }
        if self.def_depth[number] < self.depth {
            if let Some(frame) = self.change_frames.last_mut() {
                frame.entry(number).or_insert_with(|| self.types[number].clone());
            }
        }
        self.types[number] = t;
    }

    fn apply_side_effects(&mut self, instr: &Instruction) {
        match instr.op() {
            Operation::Reassign => {
                let t = self.type_of(instr.input(1));
                self.retype(instr.input(0), t);
            }
            Operation::Update { op } => {
                let t = self.binary_result(*op, instr.input(0), instr.input(1));
                self.retype(instr.input(0), t);
            }
            Operation::UnaryOperation { op } if op.reassigns() => {
                self.retype(instr.input(0), Type::number());
            }
            Operation::SetProperty { name } => {
                // The fuzzer-wide property table learns from every observed
                // write.
                let value_type = self.type_of(instr.input(1));
                self.env.record_property_type(name, &value_type);
                let updated = self.type_of(instr.input(0)).adding_property(name);
                self.retype(instr.input(0), updated);
            }
            Operation::ObjectLiteralAddProperty { name } => {
                if let Some(literal) = self.object_literals.last_mut() {
                    literal.properties.push(name.clone());
                }
            }
            Operation::BeginObjectLiteralMethod { name, .. } => {
                if let Some(literal) = self.object_literals.last_mut() {
                    literal.methods.push(name.clone());
                }
            }
            Operation::ClassAddInstanceProperty { name, .. } => {
                if let Some(class) = self.class_definitions.last_mut() {
                    class.properties.push(name.clone());
                }
            }
            Operation::BeginClassInstanceMethod { name, .. } => {
                if let Some(class) = self.class_definitions.last_mut() {
                    class.methods.push(name.clone());
                }
            }
            _ => {}
        }
    }

    fn infer_output_type(&mut self, instr: &Instruction) -> Type {
        match instr.op() {
            Operation::LoadInteger { .. } => Type::integer(),
            Operation::LoadBigInt { .. } => Type::big_int(),
            Operation::LoadFloat { .. } => Type::float(),
            Operation::LoadString { .. } => Type::string(),
            Operation::LoadBoolean { .. } => Type::boolean(),
            Operation::LoadUndefined => Type::undefined(),
            Operation::LoadNull => Type::null(),
            Operation::LoadRegExp { .. } => Type::reg_exp(),
            Operation::LoadBuiltin { name } => self.env.type_of_builtin(name),
            Operation::LoadArguments
            | Operation::CreateArray { .. }
            | Operation::CreateArrayWithSpread { .. }
            | Operation::CreateIntArray { .. }
            | Operation::CreateFloatArray { .. } => Environment::array_type(),
            Operation::EndObjectLiteral => {
                let shape = self.object_literals.pop().unwrap_or_default();
                let properties: Vec<&str> = shape.properties.iter().map(String::as_str).collect();
                let methods: Vec<&str> = shape.methods.iter().map(String::as_str).collect();
                Type::object_with(None, &properties, &methods)
            }
            Operation::BeginClassDefinition { .. } => Type::constructor(),
            Operation::UnaryOperation { op } => match op {
                UnaryOperator::LogicalNot => Type::boolean(),
                UnaryOperator::BitwiseNot => Type::integer(),
                _ => Type::number(),
            },
            Operation::BinaryOperation { op } => {
                self.binary_result(*op, instr.input(0), instr.input(1))
            }
            Operation::TernaryOperation => {
                self.type_of(instr.input(1)).uniting(&self.type_of(instr.input(2)))
            }
            Operation::Dup => self.type_of(instr.input(0)),
            Operation::Compare { .. }
            | Operation::TestInstanceOf
            | Operation::TestIn
            | Operation::DeleteProperty { .. } => Type::boolean(),
            Operation::TypeOf => Type::string(),
            Operation::GetProperty { name } => self.env.type_of_property(name),
            Operation::CallFunction { .. } | Operation::CallComputedMethod { .. } => self
                .type_of(instr.input(0))
                .signature()
                .map_or_else(Type::unknown, |sig| sig.return_type.clone()),
            Operation::Construct { .. } => self
                .type_of(instr.input(0))
                .signature()
                .map_or_else(Type::object, |sig| sig.return_type.clone()),
            Operation::CallMethod { name, .. } => {
                let receiver = self.type_of(instr.input(0));
                self.env.method_signature(name, &receiver).return_type
            }
            Operation::BeginPlainFunction { num_parameters, signature }
            | Operation::BeginArrowFunction { num_parameters, signature }
            | Operation::BeginGeneratorFunction { num_parameters, signature }
            | Operation::BeginAsyncFunction { num_parameters, signature } => {
                let sig = signature
                    .clone()
                    .unwrap_or_else(|| Signature::any(*num_parameters as usize));
                Type::function_with(sig)
            }
            _ => Type::unknown(),
        }
    }

    fn infer_inner_output_type(&self, op: &Operation, index: usize) -> Type {
        match op {
            Operation::BeginPlainFunction { signature, .. }
            | Operation::BeginArrowFunction { signature, .. }
            | Operation::BeginGeneratorFunction { signature, .. }
            | Operation::BeginAsyncFunction { signature, .. }
            | Operation::BeginObjectLiteralMethod { signature, .. } => {
                Self::parameter_type(signature.as_ref(), index)
            }
            // Inner output 0 of constructors and methods is `this`.
            Operation::BeginClassConstructor { signature, .. }
            | Operation::BeginClassInstanceMethod { signature, .. } => {
                if index == 0 {
                    Type::object()
                } else {
                    Self::parameter_type(signature.as_ref(), index - 1)
                }
            }
            Operation::BeginForLoop { .. } => Type::number(),
            Operation::BeginForInLoop => Type::string(),
            _ => Type::unknown(),
        }
    }

    fn parameter_type(signature: Option<&Signature>, index: usize) -> Type {
        signature
            .and_then(|sig| sig.parameters.get(index))
            .map_or_else(Type::anything, |p| p.parameter_type().clone())
    }

    fn binary_result(&self, op: BinaryOperator, lhs: Variable, rhs: Variable) -> Type {
        match op {
            BinaryOperator::Add => {
                let l = self.type_of(lhs);
                let r = self.type_of(rhs);
                if l.is(&Type::integer()) && r.is(&Type::integer()) {
                    Type::integer()
                } else if l.is(&Type::number()) && r.is(&Type::number()) {
                    Type::number()
                } else {
                    Type::number().uniting(&Type::string())
                }
            }
            BinaryOperator::Sub
            | BinaryOperator::Mul
            | BinaryOperator::Div
            | BinaryOperator::Mod
            | BinaryOperator::Exp => Type::number(),
            BinaryOperator::BitAnd
            | BinaryOperator::BitOr
            | BinaryOperator::Xor
            | BinaryOperator::LShift
            | BinaryOperator::RShift
            | BinaryOperator::UnsignedRShift => Type::integer(),
            BinaryOperator::LogicAnd | BinaryOperator::LogicOr => {
                self.type_of(lhs).uniting(&self.type_of(rhs))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Comparator;

    fn v(n: usize) -> Variable {
        Variable::new(n)
    }

    fn analyzer() -> TypeAnalyzer {
        TypeAnalyzer::new(Rc::new(Environment::javascript()))
    }

    #[test]
    fn literals_and_arithmetic() {
        let mut a = analyzer();
        a.analyze(&Instruction::new(Operation::LoadInteger { value: 1 }, [v(0)]));
        a.analyze(&Instruction::new(Operation::LoadInteger { value: 2 }, [v(1)]));
        a.analyze(&Instruction::new(
            Operation::BinaryOperation { op: BinaryOperator::Add },
            [v(0), v(1), v(2)],
        ));
        assert_eq!(a.type_of(v(2)), Type::integer());
        a.analyze(&Instruction::new(
            Operation::Compare { op: Comparator::LessThan },
            [v(0), v(2), v(3)],
        ));
        assert_eq!(a.type_of(v(3)), Type::boolean());
    }

    #[test]
    fn reassignment_overwrites() {
        let mut a = analyzer();
        a.analyze(&Instruction::new(Operation::LoadInteger { value: 1 }, [v(0)]));
        a.analyze(&Instruction::new(Operation::LoadString { value: "s".into() }, [v(1)]));
        a.analyze(&Instruction::new(Operation::Reassign, [v(0), v(1)]));
        assert_eq!(a.type_of(v(0)), Type::string());
    }

    #[test]
    fn conditional_retype_widens_on_block_exit() {
        let mut a = analyzer();
        a.analyze(&Instruction::new(Operation::LoadInteger { value: 1 }, [v(0)]));
        a.analyze(&Instruction::new(Operation::LoadBoolean { value: true }, [v(1)]));
        a.analyze(&Instruction::new(Operation::BeginIf { inverted: false }, [v(1)]));
        a.analyze(&Instruction::new(Operation::LoadString { value: "s".into() }, [v(2)]));
        a.analyze(&Instruction::new(Operation::Reassign, [v(0), v(2)]));
        assert_eq!(a.type_of(v(0)), Type::string());
        a.analyze(&Instruction::new(Operation::EndIf, []));
        assert_eq!(a.type_of(v(0)), Type::integer().uniting(&Type::string()));
    }

    #[test]
    fn object_literal_shape_is_collected() {
        let mut a = analyzer();
        a.analyze(&Instruction::new(Operation::LoadInteger { value: 1 }, [v(0)]));
        a.analyze(&Instruction::new(Operation::BeginObjectLiteral, []));
        a.analyze(&Instruction::new(
            Operation::ObjectLiteralAddProperty { name: "x".into() },
            [v(0)],
        ));
        a.analyze(&Instruction::new(Operation::EndObjectLiteral, [v(1)]));
        let t = a.type_of(v(1));
        assert!(t.is_object());
        assert_eq!(t.properties(), &["x".to_owned()]);
    }

    #[test]
    fn function_signature_types_parameters() {
        let mut a = analyzer();
        let sig = Signature {
            parameters: vec![crate::ir::Parameter::Plain(Type::integer())],
            return_type: Type::string(),
        };
        a.analyze(&Instruction::new(
            Operation::BeginPlainFunction { num_parameters: 1, signature: Some(sig) },
            [v(0), v(1)],
        ));
        assert_eq!(a.type_of(v(1)), Type::integer());
        a.analyze(&Instruction::new(Operation::EndPlainFunction, []));
        a.analyze(&Instruction::new(Operation::LoadInteger { value: 5 }, [v(2)]));
        a.analyze(&Instruction::new(
            Operation::CallFunction { num_arguments: 1 },
            [v(0), v(2), v(3)],
        ));
        assert_eq!(a.type_of(v(3)), Type::string());
    }
}
