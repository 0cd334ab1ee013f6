//! Code generators: the pluggable strategies that grow programs.
//!
//! A generator declares the context it needs, optional typed inputs, and
//! whether it recurses back into the build loop; the loop filters by those
//! declarations and picks uniformly. The default library below covers
//! literals, operators, property traffic, calls, and every block construct,
//! which is enough for the build loop to bootstrap an empty program and keep
//! growing it.

use std::rc::Rc;

use rand::{Rng, seq::SliceRandom};

use crate::{
    builder::ProgramBuilder,
    ir::{
        BinaryOperator, Comparator, Context, RegExpFlags, Signature, Type, UnaryOperator, Variable,
    },
};

/// How a generator's declared inputs are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Unknown-typed variables are acceptable and any visible variable is
    /// better than nothing.
    #[default]
    Loose,
    /// Only statically matching variables; the generator is skipped on a
    /// miss.
    Strict,
}

type GeneratorFn = Box<dyn Fn(&mut ProgramBuilder, &[Variable])>;

/// One pluggable code-generation strategy.
pub struct CodeGenerator {
    name: &'static str,
    required_context: Context,
    input_types: Vec<Type>,
    input_mode: InputMode,
    is_recursive: bool,
    is_value_generator: bool,
    f: GeneratorFn,
}

impl CodeGenerator {
    /// A generator with no declared inputs.
    pub fn new(name: &'static str, f: impl Fn(&mut ProgramBuilder) + 'static) -> Self {
        Self {
            name,
            required_context: Context::SCRIPT,
            input_types: Vec::new(),
            input_mode: InputMode::default(),
            is_recursive: false,
            is_value_generator: false,
            f: Box::new(move |b, _| f(b)),
        }
    }

    /// A value generator: produces a value from nothing and is used to
    /// bootstrap empty scopes.
    pub fn value(name: &'static str, f: impl Fn(&mut ProgramBuilder) + 'static) -> Self {
        Self {
            is_value_generator: true,
            ..Self::new(name, f)
        }
    }

    /// A generator consuming the given input types.
    pub fn with_inputs(
        name: &'static str,
        input_types: Vec<Type>,
        input_mode: InputMode,
        f: impl Fn(&mut ProgramBuilder, &[Variable]) + 'static,
    ) -> Self {
        Self {
            name,
            required_context: Context::SCRIPT,
            input_types,
            input_mode,
            is_recursive: false,
            is_value_generator: false,
            f: Box::new(f),
        }
    }

    /// A generator that opens a block and calls back into the build loop.
    pub fn recursive(name: &'static str, f: impl Fn(&mut ProgramBuilder) + 'static) -> Self {
        Self {
            is_recursive: true,
            ..Self::new(name, f)
        }
    }

    /// A recursive generator consuming the given input types.
    pub fn recursive_with_inputs(
        name: &'static str,
        input_types: Vec<Type>,
        input_mode: InputMode,
        f: impl Fn(&mut ProgramBuilder, &[Variable]) + 'static,
    ) -> Self {
        Self {
            is_recursive: true,
            ..Self::with_inputs(name, input_types, input_mode, f)
        }
    }

    /// Restricts the generator to the given context.
    #[must_use]
    pub fn in_context(mut self, context: Context) -> Self {
        self.required_context = context;
        self
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn required_context(&self) -> Context {
        self.required_context
    }

    #[must_use]
    pub fn input_types(&self) -> &[Type] {
        &self.input_types
    }

    #[must_use]
    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    #[must_use]
    pub fn is_recursive(&self) -> bool {
        self.is_recursive
    }

    #[must_use]
    pub fn is_value_generator(&self) -> bool {
        self.is_value_generator
    }

    /// Runs the generator with resolved inputs.
    pub fn run(&self, b: &mut ProgramBuilder, inputs: &[Variable]) {
        debug_assert_eq!(inputs.len(), self.input_types.len());
        (self.f)(b, inputs);
    }
}

/// The set of generators available to a fuzzer instance.
pub struct GeneratorLibrary {
    generators: Vec<Rc<CodeGenerator>>,
}

impl GeneratorLibrary {
    /// A library with exactly the given generators.
    #[must_use]
    pub fn with_generators(generators: Vec<CodeGenerator>) -> Self {
        Self {
            generators: generators.into_iter().map(Rc::new).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CodeGenerator> {
        self.generators.iter().map(Rc::as_ref)
    }

    /// Only the value generators, used for bootstrapping.
    pub fn value_generators(&self) -> impl Iterator<Item = &CodeGenerator> {
        self.iter().filter(|g| g.is_value_generator())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.generators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

impl Default for GeneratorLibrary {
    fn default() -> Self {
        Self::with_generators(builtin_generators())
    }
}

fn rand_comparator(b: &mut ProgramBuilder) -> Comparator {
    *Comparator::ALL.choose(b.rng()).expect("comparator table is not empty")
}

fn rand_binary_op(b: &mut ProgramBuilder) -> BinaryOperator {
    *BinaryOperator::ALL.choose(b.rng()).expect("operator table is not empty")
}

fn rand_unary_op(b: &mut ProgramBuilder) -> UnaryOperator {
    *UnaryOperator::ALL.choose(b.rng()).expect("operator table is not empty")
}

/// The default generator library.
pub fn builtin_generators() -> Vec<CodeGenerator> {
    let mut generators = vec![
        // Value generators, used both in normal operation and to bootstrap
        // an empty scope.
        CodeGenerator::value("IntegerGenerator", |b| {
            let value = b.rand_int();
            b.load_int(value);
        }),
        CodeGenerator::value("BigIntGenerator", |b| {
            let value = b.rand_int();
            b.load_big_int(value);
        }),
        CodeGenerator::value("FloatGenerator", |b| {
            let value = b.rand_float();
            b.load_float(value);
        }),
        CodeGenerator::value("StringGenerator", |b| {
            let value = b.rand_string();
            b.load_string(value);
        }),
        CodeGenerator::value("BooleanGenerator", |b| {
            let value = b.probability(0.5);
            b.load_bool(value);
        }),
        CodeGenerator::value("UndefinedGenerator", |b| {
            b.load_undefined();
        }),
        CodeGenerator::value("NullGenerator", |b| {
            b.load_null();
        }),
        CodeGenerator::value("RegExpGenerator", |b| {
            let pattern = b.rand_reg_exp_pattern();
            let flags = if b.probability(0.3) {
                RegExpFlags::GLOBAL
            } else {
                RegExpFlags::empty()
            };
            b.load_reg_exp(pattern, flags);
        }),
        CodeGenerator::value("BuiltinGenerator", |b| {
            let name = b.rand_builtin();
            b.reuse_or_load_builtin(&name);
        }),
        CodeGenerator::value("IntArrayGenerator", |b| {
            let len = b.rng().gen_range(0..8);
            let values = (0..len).map(|_| b.rand_int()).collect();
            b.create_int_array(values);
        }),
        CodeGenerator::value("FloatArrayGenerator", |b| {
            let len = b.rng().gen_range(0..8);
            let values = (0..len).map(|_| b.rand_float()).collect();
            b.create_float_array(values);
        }),
        // Plain generators.
        CodeGenerator::new("ArrayGenerator", |b| {
            let elements = b.rand_vars(4);
            b.create_array(&elements);
        }),
        CodeGenerator::new("ArrayWithSpreadGenerator", |b| {
            let elements = b.rand_vars(4);
            let spreads = elements.iter().map(|_| b.probability(0.25)).collect();
            b.create_array_with_spread(&elements, spreads);
        }),
        CodeGenerator::with_inputs(
            "ComparisonGenerator",
            vec![Type::anything(), Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                let op = rand_comparator(b);
                b.compare(op, inputs[0], inputs[1]);
            },
        ),
        CodeGenerator::with_inputs(
            "BinaryOperationGenerator",
            vec![Type::anything(), Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                let op = rand_binary_op(b);
                b.binary(op, inputs[0], inputs[1]);
            },
        ),
        CodeGenerator::with_inputs(
            "UnaryOperationGenerator",
            vec![Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                let op = rand_unary_op(b);
                b.unary(op, inputs[0]);
            },
        ),
        CodeGenerator::with_inputs(
            "TernaryOperationGenerator",
            vec![Type::anything(), Type::anything(), Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                b.ternary(inputs[0], inputs[1], inputs[2]);
            },
        ),
        CodeGenerator::with_inputs(
            "UpdateGenerator",
            vec![Type::number(), Type::number()],
            InputMode::Loose,
            |b, inputs| {
                let op = rand_binary_op(b);
                b.update(op, inputs[0], inputs[1]);
            },
        ),
        CodeGenerator::with_inputs(
            "ReassignGenerator",
            vec![Type::anything(), Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                b.reassign(inputs[0], inputs[1]);
            },
        ),
        CodeGenerator::with_inputs(
            "DupGenerator",
            vec![Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                b.dup(inputs[0]);
            },
        ),
        CodeGenerator::with_inputs(
            "TypeTestGenerator",
            vec![Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                b.type_of_value(inputs[0]);
            },
        ),
        CodeGenerator::with_inputs(
            "InstanceOfGenerator",
            vec![Type::anything(), Type::constructor()],
            InputMode::Strict,
            |b, inputs| {
                b.test_instance_of(inputs[0], inputs[1]);
            },
        ),
        CodeGenerator::with_inputs(
            "InGenerator",
            vec![Type::string(), Type::object()],
            InputMode::Loose,
            |b, inputs| {
                b.test_in(inputs[0], inputs[1]);
            },
        ),
        CodeGenerator::with_inputs(
            "PropertyRetrievalGenerator",
            vec![Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                let name = b.rand_property_for_reading(inputs[0]);
                b.get_property(inputs[0], name);
            },
        ),
        CodeGenerator::with_inputs(
            "PropertyAssignmentGenerator",
            vec![Type::anything(), Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                let name = b.rand_property_for_writing(inputs[0]);
                b.set_property(inputs[0], name, inputs[1]);
            },
        ),
        CodeGenerator::with_inputs(
            "PropertyRemovalGenerator",
            vec![Type::object()],
            InputMode::Loose,
            |b, inputs| {
                let name = b.rand_property_for_writing(inputs[0]);
                b.delete_property(inputs[0], name);
            },
        ),
        CodeGenerator::with_inputs(
            "ElementRetrievalGenerator",
            vec![Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                let index = b.rng().gen_range(-2..16);
                b.get_element(inputs[0], index);
            },
        ),
        CodeGenerator::with_inputs(
            "ElementAssignmentGenerator",
            vec![Type::anything(), Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                let index = b.rng().gen_range(-2..16);
                b.set_element(inputs[0], index, inputs[1]);
            },
        ),
        CodeGenerator::with_inputs(
            "ComputedPropertyRetrievalGenerator",
            vec![Type::anything(), Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                b.get_computed_property(inputs[0], inputs[1]);
            },
        ),
        CodeGenerator::with_inputs(
            "ComputedPropertyAssignmentGenerator",
            vec![Type::anything(), Type::anything(), Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                b.set_computed_property(inputs[0], inputs[1], inputs[2]);
            },
        ),
        CodeGenerator::new("FunctionCallGenerator", |b| {
            let Some(function) = b.rand_callable() else {
                return;
            };
            let signature = b
                .type_of(function)
                .signature()
                .cloned()
                .unwrap_or_else(|| Signature::any(b.rng().gen_range(0..3)));
            let args = b.rand_arguments_for(&signature);
            b.call_function(function, &args);
        }),
        CodeGenerator::with_inputs(
            "ConstructorCallGenerator",
            vec![Type::constructor()],
            InputMode::Strict,
            |b, inputs| {
                let signature = b
                    .type_of(inputs[0])
                    .signature()
                    .cloned()
                    .unwrap_or_else(|| Signature::any(b.rng().gen_range(0..3)));
                let args = b.rand_arguments_for(&signature);
                b.construct(inputs[0], &args);
            },
        ),
        CodeGenerator::with_inputs(
            "MethodCallGenerator",
            vec![Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                let name = b.rand_method(inputs[0]);
                let signature = b.method_signature(&name, inputs[0]);
                let args = b.rand_arguments_for(&signature);
                b.call_method(inputs[0], name, &args);
            },
        ),
        CodeGenerator::with_inputs(
            "ComputedMethodCallGenerator",
            vec![Type::object(), Type::string()],
            InputMode::Loose,
            |b, inputs| {
                let args = b.rand_vars(2);
                b.call_computed_method(inputs[0], inputs[1], &args);
            },
        ),
        CodeGenerator::with_inputs(
            "ThrowGenerator",
            vec![Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                b.throw_exception(inputs[0]);
            },
        ),
        // Statements bound to special contexts.
        CodeGenerator::with_inputs(
            "ReturnGenerator",
            vec![Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                b.return_value(inputs[0]);
            },
        )
        .in_context(Context::SCRIPT | Context::SUBROUTINE),
        CodeGenerator::with_inputs(
            "YieldGenerator",
            vec![Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                b.yield_value(inputs[0]);
            },
        )
        .in_context(Context::SCRIPT | Context::GENERATOR_FUNCTION),
        CodeGenerator::with_inputs(
            "AwaitGenerator",
            vec![Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                b.await_value(inputs[0]);
            },
        )
        .in_context(Context::SCRIPT | Context::ASYNC_FUNCTION),
        CodeGenerator::new("LoopBreakGenerator", |b| {
            b.loop_break();
        })
        .in_context(Context::SCRIPT | Context::LOOP),
        CodeGenerator::new("LoopContinueGenerator", |b| {
            b.loop_continue();
        })
        .in_context(Context::SCRIPT | Context::LOOP),
    ];

    generators.extend(recursive_generators());
    generators
}

fn recursive_generators() -> Vec<CodeGenerator> {
    vec![
        CodeGenerator::recursive("PlainFunctionGenerator", |b| {
            let num_parameters = b.rng().gen_range(0..=3u16);
            let signature = Signature::any(num_parameters as usize);
            let function =
                b.build_plain_function(num_parameters, Some(signature.clone()), |b, _params| {
                    b.build_recursive(1, 1, None);
                    if let Some(result) = b.rand_var() {
                        b.return_value(result);
                    }
                });
            if b.probability(0.5) {
                let args = b.rand_arguments_for(&signature);
                b.call_function(function, &args);
            }
        }),
        CodeGenerator::recursive("ArrowFunctionGenerator", |b| {
            let num_parameters = b.rng().gen_range(0..=2u16);
            b.build_arrow_function(num_parameters, None, |b, _params| {
                b.build_recursive(1, 1, None);
            });
        }),
        CodeGenerator::recursive("GeneratorFunctionGenerator", |b| {
            let num_parameters = b.rng().gen_range(0..=2u16);
            b.build_generator_function(num_parameters, None, |b, _params| {
                b.build_recursive(1, 1, None);
                if let Some(result) = b.rand_var() {
                    b.yield_value(result);
                }
            });
        }),
        CodeGenerator::recursive("AsyncFunctionGenerator", |b| {
            let num_parameters = b.rng().gen_range(0..=2u16);
            b.build_async_function(num_parameters, None, |b, _params| {
                b.build_recursive(1, 1, None);
                if let Some(result) = b.rand_var() {
                    b.await_value(result);
                }
            });
        }),
        CodeGenerator::recursive("WhileLoopGenerator", |b| {
            let counter = b.reuse_or_load_int(0);
            let limit = b.reuse_or_load_int(8);
            b.build_while_loop(counter, limit, Comparator::LessThan, |b| {
                b.build_recursive(1, 1, None);
                let one = b.reuse_or_load_int(1);
                b.update(BinaryOperator::Add, counter, one);
            });
        }),
        CodeGenerator::recursive("DoWhileLoopGenerator", |b| {
            let counter = b.reuse_or_load_int(0);
            let limit = b.reuse_or_load_int(4);
            b.build_do_while_loop(counter, limit, Comparator::LessThan, |b| {
                b.build_recursive(1, 1, None);
                let one = b.reuse_or_load_int(1);
                b.update(BinaryOperator::Add, counter, one);
            });
        }),
        CodeGenerator::recursive("ForLoopGenerator", |b| {
            let start = b.reuse_or_load_int(0);
            let end = b.reuse_or_load_int(10);
            let step = b.reuse_or_load_int(1);
            b.build_for_loop(start, end, step, Comparator::LessThan, BinaryOperator::Add, |b, _i| {
                b.build_recursive(1, 1, None);
            });
        }),
        CodeGenerator::recursive_with_inputs(
            "ForInLoopGenerator",
            vec![Type::object()],
            InputMode::Loose,
            |b, inputs| {
                b.build_for_in_loop(inputs[0], |b, _key| {
                    b.build_recursive(1, 1, None);
                });
            },
        ),
        CodeGenerator::recursive_with_inputs(
            "ForOfLoopGenerator",
            vec![Type::object()],
            InputMode::Loose,
            |b, inputs| {
                b.build_for_of_loop(inputs[0], |b, _element| {
                    b.build_recursive(1, 1, None);
                });
            },
        ),
        CodeGenerator::recursive_with_inputs(
            "IfElseGenerator",
            vec![Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                b.build_if_else(
                    inputs[0],
                    |b| b.build_recursive(1, 2, None),
                    |b| b.build_recursive(2, 2, None),
                );
            },
        ),
        CodeGenerator::recursive_with_inputs(
            "IfGenerator",
            vec![Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                b.build_if(inputs[0], |b| b.build_recursive(1, 1, None));
            },
        ),
        CodeGenerator::recursive("TryCatchGenerator", |b| {
            b.build_try_catch(
                |b| b.build_recursive(1, 2, None),
                |b, _exception| b.build_recursive(2, 2, None),
            );
        }),
        CodeGenerator::recursive("TryFinallyGenerator", |b| {
            b.build_try_finally(
                |b| b.build_recursive(1, 2, None),
                |b| b.build_recursive(2, 2, None),
            );
        }),
        CodeGenerator::recursive_with_inputs(
            "SwitchGenerator",
            vec![Type::anything(), Type::anything(), Type::anything()],
            InputMode::Loose,
            |b, inputs| {
                let on = inputs[0];
                let case_values = [inputs[1], inputs[2]];
                b.build_switch(on, |sw| {
                    sw.add_case(case_values[0], |b| b.build_recursive(1, 3, None));
                    sw.add_case(case_values[1], |b| b.build_recursive(2, 3, None));
                    sw.add_default(|b| b.build_recursive(3, 3, None));
                });
            },
        ),
        CodeGenerator::recursive("ObjectLiteralGenerator", |b| {
            let values = b.rand_vars(3);
            b.build_object_literal(|ol| {
                for (i, &value) in values.iter().enumerate() {
                    let name = ["a", "b", "c"][i % 3];
                    ol.add_property(name, value);
                }
            });
        }),
        CodeGenerator::recursive("ObjectWithMethodGenerator", |b| {
            b.build_object_literal(|ol| {
                ol.add_method("m", 1, |b, _params| {
                    b.build_recursive(1, 1, None);
                    if let Some(result) = b.rand_var() {
                        b.return_value(result);
                    }
                });
            });
        }),
        CodeGenerator::recursive("ClassGenerator", |b| {
            let class = b.build_class_definition(None, |cd| {
                cd.add_instance_property("a", None);
                cd.add_constructor(1, |b, args| {
                    let this = args[0];
                    let value = args[1];
                    b.set_property(this, "a", value);
                });
                cd.add_instance_method("m", 0, |b, _args| {
                    b.build_recursive(1, 1, None);
                });
            });
            if b.probability(0.5) {
                let args = b.rand_vars(1);
                b.construct(class, &args);
            }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_library_is_populated() {
        let lib = GeneratorLibrary::default();
        assert!(lib.len() > 30);
        assert!(lib.value_generators().count() >= 8);
        assert!(lib.iter().any(|g| g.is_recursive()));
    }
}
