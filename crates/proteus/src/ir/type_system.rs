//! The type lattice used for variable queries.
//!
//! Types here are hints, not guarantees: the analyzer infers them with a
//! single forward pass and mutators must tolerate imprecision. The lattice is
//! a bitset of base types plus an optional extension carrying object shape
//! (group, properties, methods) and function signatures.
//!
//! `unknown` is deliberately distinct from `anything`: `anything` means "could
//! be any value", `unknown` means "inference gave up". Input queries treat
//! unknown as top so that imprecise inference never starves the builder of
//! candidates.

use std::{fmt, rc::Rc};

use bitflags::bitflags;

bitflags! {
    /// Base type bits.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct BaseType: u32 {
        const UNDEFINED = 1 << 0;
        const NULL = 1 << 1;
        const BOOLEAN = 1 << 2;
        const INTEGER = 1 << 3;
        const BIG_INT = 1 << 4;
        const FLOAT = 1 << 5;
        const STRING = 1 << 6;
        const REG_EXP = 1 << 7;
        const OBJECT = 1 << 8;
        const FUNCTION = 1 << 9;
        const CONSTRUCTOR = 1 << 10;
        const ITERABLE = 1 << 11;
        /// Inference failure marker. Never combined with other bits.
        const UNKNOWN = 1 << 31;
    }
}

impl BaseType {
    /// All value bits, excluding the unknown marker.
    const ANYTHING: Self = Self::UNDEFINED
        .union(Self::NULL)
        .union(Self::BOOLEAN)
        .union(Self::INTEGER)
        .union(Self::BIG_INT)
        .union(Self::FLOAT)
        .union(Self::STRING)
        .union(Self::REG_EXP)
        .union(Self::OBJECT)
        .union(Self::FUNCTION)
        .union(Self::CONSTRUCTOR)
        .union(Self::ITERABLE);
}

/// Shape information attached to object and function types.
///
/// Kept behind an `Rc` so that cloning types (which happens on every inferred
/// instruction) stays cheap.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeExtension {
    /// Group name tying the object to an environment-registered shape
    /// (e.g. "Array", "Math").
    pub group: Option<String>,
    /// Property names known to exist on the object.
    pub properties: Vec<String>,
    /// Method names known to exist on the object.
    pub methods: Vec<String>,
    /// Call signature, for function and constructor types.
    pub signature: Option<Signature>,
}

impl TypeExtension {
    fn is_trivial(&self) -> bool {
        self.group.is_none()
            && self.properties.is_empty()
            && self.methods.is_empty()
            && self.signature.is_none()
    }
}

/// A type in the lattice.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Type {
    base: BaseType,
    ext: Option<Rc<TypeExtension>>,
}

impl Type {
    /// The empty type. No value has this type.
    #[must_use]
    pub fn nothing() -> Self {
        Self::default()
    }

    /// The top of the value lattice: any value.
    #[must_use]
    pub fn anything() -> Self {
        Self::from_base(BaseType::ANYTHING)
    }

    /// The inference-failure type.
    #[must_use]
    pub fn unknown() -> Self {
        Self::from_base(BaseType::UNKNOWN)
    }

    #[must_use]
    pub fn undefined() -> Self {
        Self::from_base(BaseType::UNDEFINED)
    }

    #[must_use]
    pub fn null() -> Self {
        Self::from_base(BaseType::NULL)
    }

    #[must_use]
    pub fn boolean() -> Self {
        Self::from_base(BaseType::BOOLEAN)
    }

    #[must_use]
    pub fn integer() -> Self {
        Self::from_base(BaseType::INTEGER)
    }

    #[must_use]
    pub fn big_int() -> Self {
        Self::from_base(BaseType::BIG_INT)
    }

    #[must_use]
    pub fn float() -> Self {
        Self::from_base(BaseType::FLOAT)
    }

    /// Integer or float.
    #[must_use]
    pub fn number() -> Self {
        Self::from_base(BaseType::INTEGER | BaseType::FLOAT)
    }

    #[must_use]
    pub fn string() -> Self {
        Self::from_base(BaseType::STRING)
    }

    #[must_use]
    pub fn reg_exp() -> Self {
        Self::from_base(BaseType::REG_EXP)
    }

    /// A plain object with no known shape.
    #[must_use]
    pub fn object() -> Self {
        Self::from_base(BaseType::OBJECT)
    }

    /// An object with a known shape.
    #[must_use]
    pub fn object_with(
        group: Option<&str>,
        properties: &[&str],
        methods: &[&str],
    ) -> Self {
        Self {
            base: BaseType::OBJECT,
            ext: Self::make_ext(TypeExtension {
                group: group.map(str::to_owned),
                properties: properties.iter().map(|s| (*s).to_owned()).collect(),
                methods: methods.iter().map(|s| (*s).to_owned()).collect(),
                signature: None,
            }),
        }
    }

    /// A function with an unknown signature.
    #[must_use]
    pub fn function() -> Self {
        Self::from_base(BaseType::FUNCTION)
    }

    /// A function with the given signature.
    #[must_use]
    pub fn function_with(signature: Signature) -> Self {
        Self {
            base: BaseType::FUNCTION,
            ext: Self::make_ext(TypeExtension {
                signature: Some(signature),
                ..TypeExtension::default()
            }),
        }
    }

    /// A constructor with an unknown signature.
    #[must_use]
    pub fn constructor() -> Self {
        Self::from_base(BaseType::CONSTRUCTOR)
    }

    /// A constructor with the given signature.
    #[must_use]
    pub fn constructor_with(signature: Signature) -> Self {
        Self {
            base: BaseType::CONSTRUCTOR,
            ext: Self::make_ext(TypeExtension {
                signature: Some(signature),
                ..TypeExtension::default()
            }),
        }
    }

    #[must_use]
    pub fn iterable() -> Self {
        Self::from_base(BaseType::ITERABLE)
    }

    fn from_base(base: BaseType) -> Self {
        Self { base, ext: None }
    }

    fn make_ext(ext: TypeExtension) -> Option<Rc<TypeExtension>> {
        if ext.is_trivial() { None } else { Some(Rc::new(ext)) }
    }

    /// Returns true if inference failed for this value.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.base.contains(BaseType::UNKNOWN)
    }

    /// Returns true if this is the empty type.
    #[must_use]
    pub fn is_nothing(&self) -> bool {
        self.base.is_empty()
    }

    /// Returns true if every value of this type is also a value of `other`:
    /// the subtype test.
    ///
    /// An object with more known properties subsumes into one requiring
    /// fewer; a type requiring a group or signature only admits subtypes
    /// carrying the same one. The unknown marker is not a subtype of
    /// anything except unknown itself; call sites that want the permissive
    /// reading check [`is_unknown`](Self::is_unknown) first.
    #[must_use]
    pub fn is(&self, other: &Self) -> bool {
        if !other.base.contains(self.base) {
            return false;
        }
        let Some(required) = other.ext.as_deref() else {
            return true;
        };
        let Some(have) = self.ext.as_deref() else {
            return required.is_trivial();
        };
        if let Some(group) = &required.group {
            if have.group.as_ref() != Some(group) {
                return false;
            }
        }
        if let Some(signature) = &required.signature {
            if have.signature.as_ref() != Some(signature) {
                return false;
            }
        }
        required.properties.iter().all(|p| have.properties.contains(p))
            && required.methods.iter().all(|m| have.methods.contains(m))
    }

    /// Returns true if the two types share at least one possible value.
    #[must_use]
    pub fn might_be(&self, other: &Self) -> bool {
        !self.base.intersection(other.base).is_empty()
    }

    /// Returns the union of the two types.
    ///
    /// Shape information only survives where both sides agree: common
    /// properties and methods, and group/signature only when equal.
    #[must_use]
    pub fn uniting(&self, other: &Self) -> Self {
        let base = self.base | other.base;
        let ext = match (self.ext.as_deref(), other.ext.as_deref()) {
            (Some(a), Some(b)) => Self::make_ext(TypeExtension {
                group: (a.group == b.group).then(|| a.group.clone()).flatten(),
                properties: a
                    .properties
                    .iter()
                    .filter(|p| b.properties.contains(p))
                    .cloned()
                    .collect(),
                methods: a
                    .methods
                    .iter()
                    .filter(|m| b.methods.contains(m))
                    .cloned()
                    .collect(),
                signature: (a.signature == b.signature)
                    .then(|| a.signature.clone())
                    .flatten(),
            }),
            _ => None,
        };
        Self { base, ext }
    }

    /// The object group, if known.
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.ext.as_deref().and_then(|e| e.group.as_deref())
    }

    /// Property names known to exist on values of this type.
    #[must_use]
    pub fn properties(&self) -> &[String] {
        self.ext.as_deref().map_or(&[], |e| &e.properties)
    }

    /// Method names known to exist on values of this type.
    #[must_use]
    pub fn methods(&self) -> &[String] {
        self.ext.as_deref().map_or(&[], |e| &e.methods)
    }

    /// The call signature, if known.
    #[must_use]
    pub fn signature(&self) -> Option<&Signature> {
        self.ext.as_deref().and_then(|e| e.signature.as_ref())
    }

    /// Returns a copy of this type with the given property added.
    #[must_use]
    pub fn adding_property(&self, name: &str) -> Self {
        let mut ext = self.ext.as_deref().cloned().unwrap_or_default();
        if !ext.properties.iter().any(|p| p == name) {
            ext.properties.push(name.to_owned());
        }
        Self {
            base: self.base,
            ext: Self::make_ext(ext),
        }
    }

    /// Returns true if values of this type can be called.
    #[must_use]
    pub fn is_callable(&self) -> bool {
        self.base
            .intersects(BaseType::FUNCTION | BaseType::CONSTRUCTOR)
    }

    /// Returns true if this type includes object values.
    #[must_use]
    pub fn is_object(&self) -> bool {
        self.base.contains(BaseType::OBJECT)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            return write!(f, ".unknown");
        }
        if self.base == BaseType::ANYTHING {
            return write!(f, ".anything");
        }
        if self.base.is_empty() {
            return write!(f, ".nothing");
        }
        let mut first = true;
        for (name, bit) in [
            ("undefined", BaseType::UNDEFINED),
            ("null", BaseType::NULL),
            ("boolean", BaseType::BOOLEAN),
            ("integer", BaseType::INTEGER),
            ("bigint", BaseType::BIG_INT),
            ("float", BaseType::FLOAT),
            ("string", BaseType::STRING),
            ("regexp", BaseType::REG_EXP),
            ("object", BaseType::OBJECT),
            ("function", BaseType::FUNCTION),
            ("constructor", BaseType::CONSTRUCTOR),
            ("iterable", BaseType::ITERABLE),
        ] {
            if self.base.contains(bit) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, ".{name}")?;
                first = false;
            }
        }
        if let Some(group) = self.group() {
            write!(f, " ({group})")?;
        }
        Ok(())
    }
}

/// A function parameter in a signature.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    /// A required parameter of the given type.
    Plain(Type),
    /// A parameter that may be omitted.
    Optional(Type),
    /// A trailing rest parameter.
    Rest(Type),
}

impl Parameter {
    /// The type a caller should pass for this parameter.
    #[must_use]
    pub fn parameter_type(&self) -> &Type {
        match self {
            Self::Plain(t) | Self::Optional(t) | Self::Rest(t) => t,
        }
    }
}

/// A function signature: parameter types plus return type.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub parameters: Vec<Parameter>,
    pub return_type: Type,
}

impl Signature {
    /// A signature taking `n` parameters of any type and returning anything.
    #[must_use]
    pub fn any(n: usize) -> Self {
        Self {
            parameters: vec![Parameter::Plain(Type::anything()); n],
            return_type: Type::anything(),
        }
    }

    /// Number of parameters, counting a rest parameter as one.
    #[must_use]
    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match p {
                Parameter::Plain(t) => write!(f, "{t}")?,
                Parameter::Optional(t) => write!(f, "opt {t}")?,
                Parameter::Rest(t) => write!(f, "...{t}")?,
            }
        }
        write!(f, ") => {}", self.return_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtyping_basics() {
        assert!(Type::integer().is(&Type::number()));
        assert!(!Type::number().is(&Type::integer()));
        assert!(Type::integer().is(&Type::anything()));
        assert!(Type::nothing().is(&Type::integer()));
        assert!(!Type::unknown().is(&Type::anything()));
        assert!(Type::unknown().is(&Type::unknown()));
    }

    #[test]
    fn object_shape_subtyping() {
        let rich = Type::object_with(Some("Array"), &["length", "0"], &["push", "pop"]);
        let poor = Type::object_with(None, &["length"], &["push"]);
        assert!(rich.is(&poor));
        assert!(!poor.is(&rich));
        assert!(rich.is(&Type::object()));
    }

    #[test]
    fn union_keeps_common_shape() {
        let a = Type::object_with(Some("A"), &["x", "y"], &[]);
        let b = Type::object_with(Some("B"), &["y", "z"], &[]);
        let u = a.uniting(&b);
        assert!(u.is_object());
        assert_eq!(u.properties(), &["y".to_owned()]);
        assert_eq!(u.group(), None);
    }

    #[test]
    fn union_of_primitives() {
        let u = Type::integer().uniting(&Type::float());
        assert_eq!(u, Type::number());
        assert!(Type::integer().is(&u));
        assert!(Type::float().might_be(&u));
    }
}
