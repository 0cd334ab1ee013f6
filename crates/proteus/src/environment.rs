//! The static environment: what the target engine is assumed to provide.
//!
//! The environment supplies the raw material for random value construction:
//! interesting integer and float constants, builtin objects with their
//! types, and pools of property and method names split by how they will be
//! used. It also owns the fuzzer-wide property-type table that mutators
//! refine as they observe the target.

use std::cell::RefCell;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::ir::{Parameter, Signature, Type};

/// Integer constants that tend to sit on interesting boundaries.
pub const INTERESTING_INTEGERS: [i64; 25] = [
    -9_007_199_254_740_993, // -maxSafeInteger - 1
    -9_007_199_254_740_992, // -maxSafeInteger
    -4_294_967_297,
    -4_294_967_296,
    -2_147_483_649,
    -2_147_483_648, // -Int32Max - 1
    -1_073_741_824,
    -65537,
    -65536,
    -4096,
    -1024,
    -256,
    -128,
    -2,
    -1,
    0,
    1,
    2,
    127,
    256,
    4096,
    65535,
    2_147_483_647, // Int32Max
    4_294_967_295, // UInt32Max
    9_007_199_254_740_991, // maxSafeInteger
];

/// Float constants covering denormals, boundaries, and specials.
pub const INTERESTING_FLOATS: [f64; 17] = [
    -f64::MAX,
    -1e12,
    -1e9,
    -1e6,
    -1e3,
    -5.0,
    -1.0,
    -f64::MIN_POSITIVE,
    -0.0,
    0.0,
    f64::MIN_POSITIVE,
    1.0,
    5.0,
    1e6,
    1e12,
    f64::MAX,
    f64::INFINITY,
];

/// A description of the target environment.
///
/// The builtin table models a generic JavaScript-flavoured host. It does not
/// aim for completeness; it aims for enough shape information that type
/// queries produce plausible programs.
pub struct Environment {
    builtins: IndexMap<String, Type>,
    /// Property names suitable for reading from arbitrary objects.
    read_property_names: Vec<&'static str>,
    /// Property names suitable for writing on arbitrary objects.
    write_property_names: Vec<&'static str>,
    /// Short custom names used when defining fresh properties.
    custom_property_names: Vec<&'static str>,
    method_names: Vec<&'static str>,
    /// Builtin property types, plus whatever mutators have learned at
    /// runtime. Interior mutability keeps the environment shareable across
    /// builders within one single-threaded fuzzer instance.
    property_types: RefCell<AHashMap<String, Type>>,
    method_signatures: RefCell<AHashMap<String, Signature>>,
}

impl Environment {
    /// Builds the default JavaScript-flavoured environment.
    #[must_use]
    pub fn javascript() -> Self {
        let mut builtins = IndexMap::new();

        let object_constructor = Type::constructor_with(Signature {
            parameters: vec![Parameter::Optional(Type::anything())],
            return_type: Type::object(),
        });
        builtins.insert("Object".to_owned(), object_constructor);
        builtins.insert(
            "Array".to_owned(),
            Type::constructor_with(Signature {
                parameters: vec![Parameter::Rest(Type::anything())],
                return_type: Self::array_type(),
            }),
        );
        builtins.insert(
            "Function".to_owned(),
            Type::constructor_with(Signature {
                parameters: vec![Parameter::Optional(Type::string())],
                return_type: Type::function(),
            }),
        );
        builtins.insert(
            "String".to_owned(),
            Type::constructor_with(Signature {
                parameters: vec![Parameter::Optional(Type::anything())],
                return_type: Type::string(),
            }),
        );
        builtins.insert(
            "Number".to_owned(),
            Type::constructor_with(Signature {
                parameters: vec![Parameter::Optional(Type::anything())],
                return_type: Type::number(),
            }),
        );
        builtins.insert(
            "Boolean".to_owned(),
            Type::constructor_with(Signature {
                parameters: vec![Parameter::Optional(Type::anything())],
                return_type: Type::boolean(),
            }),
        );
        builtins.insert(
            "BigInt".to_owned(),
            Type::constructor_with(Signature {
                parameters: vec![Parameter::Plain(Type::number())],
                return_type: Type::big_int(),
            }),
        );
        builtins.insert(
            "RegExp".to_owned(),
            Type::constructor_with(Signature {
                parameters: vec![Parameter::Plain(Type::string())],
                return_type: Type::reg_exp(),
            }),
        );
        builtins.insert(
            "Symbol".to_owned(),
            Type::object_with(Some("Symbol"), &["iterator", "asyncIterator"], &["for"]),
        );
        builtins.insert(
            "Math".to_owned(),
            Type::object_with(
                Some("Math"),
                &["PI", "E"],
                &["abs", "ceil", "floor", "round", "max", "min", "pow", "sqrt", "random"],
            ),
        );
        builtins.insert(
            "JSON".to_owned(),
            Type::object_with(Some("JSON"), &[], &["parse", "stringify"]),
        );
        builtins.insert(
            "Reflect".to_owned(),
            Type::object_with(
                Some("Reflect"),
                &[],
                &["apply", "construct", "defineProperty", "get", "has", "ownKeys", "set"],
            ),
        );
        for ctor in ["Promise", "Proxy", "Map", "Set", "WeakMap", "WeakSet", "ArrayBuffer", "DataView"] {
            builtins.insert(ctor.to_owned(), Type::constructor());
        }
        for ctor in [
            "Int8Array",
            "Uint8Array",
            "Uint8ClampedArray",
            "Int16Array",
            "Uint16Array",
            "Int32Array",
            "Uint32Array",
            "Float32Array",
            "Float64Array",
            "BigInt64Array",
            "BigUint64Array",
        ] {
            builtins.insert(
                ctor.to_owned(),
                Type::constructor_with(Signature {
                    parameters: vec![Parameter::Optional(Type::anything())],
                    return_type: Type::object_with(
                        Some(ctor),
                        &["length", "buffer", "byteLength"],
                        &["fill", "set", "subarray", "slice"],
                    ),
                }),
            );
        }
        for ctor in ["Error", "TypeError", "RangeError", "SyntaxError"] {
            builtins.insert(
                ctor.to_owned(),
                Type::constructor_with(Signature {
                    parameters: vec![Parameter::Optional(Type::string())],
                    return_type: Type::object_with(None, &["message", "name"], &["toString"]),
                }),
            );
        }
        for f in ["parseInt", "parseFloat", "isNaN", "isFinite"] {
            builtins.insert(
                f.to_owned(),
                Type::function_with(Signature {
                    parameters: vec![Parameter::Plain(Type::anything())],
                    return_type: Type::number(),
                }),
            );
        }
        builtins.insert("Infinity".to_owned(), Type::float());
        builtins.insert("NaN".to_owned(), Type::float());
        builtins.insert("globalThis".to_owned(), Type::object());

        let mut property_types = AHashMap::new();
        property_types.insert("length".to_owned(), Type::integer());
        property_types.insert("name".to_owned(), Type::string());
        property_types.insert("message".to_owned(), Type::string());
        property_types.insert("constructor".to_owned(), Type::constructor());
        property_types.insert("prototype".to_owned(), Type::object());
        property_types.insert("__proto__".to_owned(), Type::object());

        let mut method_signatures = AHashMap::new();
        method_signatures.insert(
            "toString".to_owned(),
            Signature { parameters: vec![], return_type: Type::string() },
        );
        method_signatures.insert(
            "valueOf".to_owned(),
            Signature { parameters: vec![], return_type: Type::anything() },
        );
        method_signatures.insert(
            "hasOwnProperty".to_owned(),
            Signature {
                parameters: vec![Parameter::Plain(Type::string())],
                return_type: Type::boolean(),
            },
        );
        method_signatures.insert(
            "push".to_owned(),
            Signature {
                parameters: vec![Parameter::Rest(Type::anything())],
                return_type: Type::integer(),
            },
        );
        method_signatures.insert(
            "pop".to_owned(),
            Signature { parameters: vec![], return_type: Type::anything() },
        );
        method_signatures.insert(
            "slice".to_owned(),
            Signature {
                parameters: vec![Parameter::Optional(Type::integer()), Parameter::Optional(Type::integer())],
                return_type: Self::array_type(),
            },
        );
        method_signatures.insert(
            "indexOf".to_owned(),
            Signature {
                parameters: vec![Parameter::Plain(Type::anything())],
                return_type: Type::integer(),
            },
        );
        method_signatures.insert(
            "join".to_owned(),
            Signature {
                parameters: vec![Parameter::Optional(Type::string())],
                return_type: Type::string(),
            },
        );
        method_signatures.insert(
            "charCodeAt".to_owned(),
            Signature {
                parameters: vec![Parameter::Plain(Type::integer())],
                return_type: Type::integer(),
            },
        );
        method_signatures.insert(
            "fill".to_owned(),
            Signature {
                parameters: vec![Parameter::Plain(Type::anything())],
                return_type: Type::object(),
            },
        );

        Self {
            builtins,
            read_property_names: vec![
                "length", "name", "message", "constructor", "prototype", "__proto__", "a", "b",
                "c", "d", "e", "toString", "valueOf",
            ],
            write_property_names: vec!["a", "b", "c", "d", "e", "length", "__proto__"],
            custom_property_names: vec!["a", "b", "c", "d", "e"],
            method_names: vec![
                "toString",
                "valueOf",
                "hasOwnProperty",
                "push",
                "pop",
                "slice",
                "join",
                "indexOf",
                "concat",
                "charCodeAt",
                "fill",
                "map",
                "filter",
                "keys",
                "values",
            ],
            property_types: RefCell::new(property_types),
            method_signatures: RefCell::new(method_signatures),
        }
    }

    /// The type of a well-formed array in this environment.
    #[must_use]
    pub fn array_type() -> Type {
        Type::object_with(
            Some("Array"),
            &["length"],
            &["push", "pop", "slice", "join", "indexOf", "concat"],
        )
    }

    /// Names of all known builtins, in table order.
    pub fn builtin_names(&self) -> impl Iterator<Item = &str> {
        self.builtins.keys().map(String::as_str)
    }

    #[must_use]
    pub fn num_builtins(&self) -> usize {
        self.builtins.len()
    }

    /// The builtin name at the given table index. Used for uniform random
    /// selection without allocating.
    #[must_use]
    pub fn builtin_name(&self, index: usize) -> &str {
        self.builtins
            .get_index(index)
            .expect("index must be below num_builtins")
            .0
    }

    /// The static type of a builtin, or unknown for unlisted names.
    #[must_use]
    pub fn type_of_builtin(&self, name: &str) -> Type {
        self.builtins.get(name).cloned().unwrap_or_else(Type::unknown)
    }

    /// The fuzzer-wide type of a property, merged from the builtin table and
    /// whatever mutators have recorded. Unknown names yield `unknown`.
    #[must_use]
    pub fn type_of_property(&self, name: &str) -> Type {
        self.property_types
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_else(Type::unknown)
    }

    /// Records an observed property type, widening any existing entry.
    pub fn record_property_type(&self, name: &str, t: &Type) {
        let mut table = self.property_types.borrow_mut();
        match table.get_mut(name) {
            Some(existing) if !existing.is_unknown() => {
                *existing = existing.uniting(t);
            }
            _ => {
                table.insert(name.to_owned(), t.clone());
            }
        }
    }

    /// The signature to assume when calling `name` on a receiver of type
    /// `receiver`. Falls back to a permissive two-argument signature.
    #[must_use]
    pub fn method_signature(&self, name: &str, receiver: &Type) -> Signature {
        let _ = receiver;
        self.method_signatures
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_else(|| Signature::any(2))
    }

    /// Records an observed method signature.
    pub fn record_method_signature(&self, name: &str, signature: Signature) {
        self.method_signatures.borrow_mut().insert(name.to_owned(), signature);
    }

    #[must_use]
    pub fn read_property_names(&self) -> &[&'static str] {
        &self.read_property_names
    }

    #[must_use]
    pub fn write_property_names(&self) -> &[&'static str] {
        &self.write_property_names
    }

    #[must_use]
    pub fn custom_property_names(&self) -> &[&'static str] {
        &self.custom_property_names
    }

    #[must_use]
    pub fn method_names(&self) -> &[&'static str] {
        &self.method_names
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::javascript()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_types_are_exposed() {
        let env = Environment::javascript();
        assert!(env.type_of_builtin("Math").is_object());
        assert!(env.type_of_builtin("parseInt").is_callable());
        assert!(env.type_of_builtin("no_such_builtin").is_unknown());
    }

    #[test]
    fn property_types_can_be_refined() {
        let env = Environment::javascript();
        assert_eq!(env.type_of_property("length"), Type::integer());
        assert!(env.type_of_property("zzz").is_unknown());
        env.record_property_type("zzz", &Type::string());
        assert_eq!(env.type_of_property("zzz"), Type::string());
        env.record_property_type("zzz", &Type::integer());
        assert_eq!(
            env.type_of_property("zzz"),
            Type::string().uniting(&Type::integer())
        );
    }
}
