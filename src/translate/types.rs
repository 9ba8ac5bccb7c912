//! Static types of synthesized code: scalar tags, collection dimensions and
//! the outer-to-inner sequences built from them.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TypeTag {
    Integer,
    Long,
    Float,
    Double,
    Boolean,
    String,
    Array,
    Hash,
    List,
    Ref,
    /// No static type could be inferred; rendered as `Object`.
    Unresolved,
}

impl TypeTag {
    /// Parse an annotation word such as `int` or `hash`.
    pub fn from_word(word: &str) -> Option<TypeTag> {
        match word.to_ascii_lowercase().as_str() {
            "int" | "integer" => Some(TypeTag::Integer),
            "long" => Some(TypeTag::Long),
            "float" => Some(TypeTag::Float),
            "double" => Some(TypeTag::Double),
            "boolean" | "bool" => Some(TypeTag::Boolean),
            "string" | "str" => Some(TypeTag::String),
            "array" => Some(TypeTag::Array),
            "hash" | "map" => Some(TypeTag::Hash),
            "list" => Some(TypeTag::List),
            "ref" => Some(TypeTag::Ref),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Integer => "int",
            TypeTag::Long => "long",
            TypeTag::Float => "float",
            TypeTag::Double => "double",
            TypeTag::Boolean => "boolean",
            TypeTag::String => "string",
            TypeTag::Array => "array",
            TypeTag::Hash => "hash",
            TypeTag::List => "list",
            TypeTag::Ref => "ref",
            TypeTag::Unresolved => "unresolved",
        }
    }

    /// Array, hash, list and ref add a dimension; everything else is a scalar.
    pub fn is_dimension(self) -> bool {
        matches!(self, TypeTag::Array | TypeTag::Hash | TypeTag::List | TypeTag::Ref)
    }

    pub fn is_numeric(self) -> bool {
        self.numeric_rank().is_some()
    }

    pub fn is_integral(self) -> bool {
        matches!(self, TypeTag::Integer | TypeTag::Long)
    }

    /// Ordered arrays and lists, the dimensions that take `[index]`.
    pub fn is_sequence(self) -> bool {
        matches!(self, TypeTag::Array | TypeTag::List)
    }

    fn numeric_rank(self) -> Option<u8> {
        match self {
            TypeTag::Integer => Some(0),
            TypeTag::Long => Some(1),
            TypeTag::Float => Some(2),
            TypeTag::Double => Some(3),
            _ => None,
        }
    }

    /// The wider of two numeric tags; `None` if either is not numeric.
    pub fn promote(self, other: TypeTag) -> Option<TypeTag> {
        let (a, b) = (self.numeric_rank()?, other.numeric_rank()?);
        Some(if a >= b { self } else { other })
    }

    fn java_primitive(self) -> &'static str {
        match self {
            TypeTag::Integer => "int",
            TypeTag::Long => "long",
            TypeTag::Float => "float",
            TypeTag::Double => "double",
            TypeTag::Boolean => "boolean",
            TypeTag::String => "String",
            _ => "Object",
        }
    }

    fn java_boxed(self) -> &'static str {
        match self {
            TypeTag::Integer => "Integer",
            TypeTag::Long => "Long",
            TypeTag::Float => "Float",
            TypeTag::Double => "Double",
            TypeTag::Boolean => "Boolean",
            TypeTag::String => "String",
            _ => "Object",
        }
    }
}

/// One level of a type sequence, optionally carrying a declared capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Type {
    pub tag: TypeTag,
    pub size: Option<u32>,
}

impl Type {
    pub fn new(tag: TypeTag) -> Self {
        Self { tag, size: None }
    }

    pub fn sized(tag: TypeTag, size: u32) -> Self {
        Self { tag, size: Some(size) }
    }
}

/// Nested dimensionality read outer to inner, e.g. ref → array → hash → string.
/// The empty sequence is the type of statements and void calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct TypeSeq(Vec<Type>);

impl TypeSeq {
    pub fn void() -> Self {
        Self(Vec::new())
    }

    pub fn scalar(tag: TypeTag) -> Self {
        Self(vec![Type::new(tag)])
    }

    pub fn from_tags(tags: &[TypeTag]) -> Self {
        Self(tags.iter().copied().map(Type::new).collect())
    }

    pub fn from_types(types: Vec<Type>) -> Self {
        Self(types)
    }

    pub fn types(&self) -> &[Type] {
        &self.0
    }

    pub fn head(&self) -> Option<TypeTag> {
        self.0.first().map(|t| t.tag)
    }

    pub fn head_size(&self) -> Option<u32> {
        self.0.first().and_then(|t| t.size)
    }

    /// The element type under the outermost dimension.
    pub fn inner(&self) -> TypeSeq {
        Self(self.0.iter().skip(1).copied().collect())
    }

    /// Add `tag` as a new outermost dimension.
    pub fn wrap(&self, tag: TypeTag) -> TypeSeq {
        let mut types = Vec::with_capacity(self.0.len() + 1);
        types.push(Type::new(tag));
        types.extend(self.0.iter().copied());
        Self(types)
    }

    pub fn is_void(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_scalar(&self) -> bool {
        self.0.len() == 1 && self.head().is_some_and(|t| !t.is_dimension())
    }

    /// A single scalar of exactly `tag`.
    pub fn is(&self, tag: TypeTag) -> bool {
        self.0.len() == 1 && self.head() == Some(tag)
    }

    pub fn is_numeric(&self) -> bool {
        self.0.len() == 1 && self.head().is_some_and(TypeTag::is_numeric)
    }

    pub fn is_integral(&self) -> bool {
        self.0.len() == 1 && self.head().is_some_and(TypeTag::is_integral)
    }

    /// Equal tags at every level; declared capacities are ignored.
    pub fn same_shape(&self, other: &TypeSeq) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a.tag == b.tag)
    }

    /// Java type for a declaration or signature. Scalars stay primitive at
    /// the top level and are boxed inside collections.
    pub fn java(&self) -> String {
        if self.is_void() {
            return "void".into();
        }
        java_of(&self.0, false)
    }

    pub fn java_boxed(&self) -> String {
        java_of(&self.0, true)
    }

    /// Initial value for a declaration without an initializer.
    pub fn default_value(&self) -> String {
        let Some(head) = self.0.first() else {
            return "null".into();
        };
        match head.tag {
            TypeTag::Integer => "0".into(),
            TypeTag::Long => "0L".into(),
            TypeTag::Float => "0f".into(),
            TypeTag::Double => "0.0".into(),
            TypeTag::Boolean => "false".into(),
            TypeTag::String | TypeTag::Unresolved | TypeTag::Ref => "null".into(),
            TypeTag::Hash => "new PerlMap<>()".into(),
            TypeTag::List => "new PerlList<>()".into(),
            TypeTag::Array => {
                let dims = self.0.iter().take_while(|t| t.tag == TypeTag::Array).count();
                let rest = self.0.get(dims..).unwrap_or_default();
                let elem = erase_generics(&java_of(rest, true));
                format!(
                    "new {elem}[{}]{}",
                    head.size.unwrap_or(0),
                    "[]".repeat(dims.saturating_sub(1))
                )
            }
        }
    }
}

fn java_of(types: &[Type], boxed: bool) -> String {
    let Some((first, rest)) = types.split_first() else {
        return "Object".into();
    };
    match first.tag {
        TypeTag::Array => format!("{}[]", java_of(rest, true)),
        TypeTag::Hash => format!("PerlMap<{}>", java_of(rest, true)),
        TypeTag::List => format!("PerlList<{}>", java_of(rest, true)),
        TypeTag::Ref => format!("Ref<{}>", java_of(rest, true)),
        tag if boxed => tag.java_boxed().into(),
        tag => tag.java_primitive().into(),
    }
}

/// Java cannot instantiate generic arrays; strip the type arguments.
pub fn erase_generics(java: &str) -> String {
    let mut out = String::with_capacity(java.len());
    let mut depth = 0usize;
    for ch in java.chars() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

impl fmt::Display for TypeSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "void");
        }
        for t in &self.0 {
            write!(f, "{}", t.tag.name())?;
            if let Some(size) = t.size {
                write!(f, "({size})")?;
            }
            if t.tag.is_dimension() {
                write!(f, "<")?;
            }
        }
        let open = self.0.iter().filter(|t| t.tag.is_dimension()).count();
        write!(f, "{}", ">".repeat(open))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_are_primitive_at_top_and_boxed_inside() {
        assert_eq!(TypeSeq::scalar(TypeTag::Integer).java(), "int");
        assert_eq!(TypeSeq::from_tags(&[TypeTag::List, TypeTag::Integer]).java(), "PerlList<Integer>");
        assert_eq!(
            TypeSeq::from_tags(&[TypeTag::Ref, TypeTag::Array, TypeTag::Hash, TypeTag::String]).java(),
            "Ref<PerlMap<String>[]>"
        );
        assert_eq!(TypeSeq::void().java(), "void");
        assert_eq!(TypeSeq::scalar(TypeTag::Unresolved).java(), "Object");
    }

    #[test]
    fn sized_array_default_allocates() {
        let t = TypeSeq::from_types(vec![Type::sized(TypeTag::Array, 10), Type::new(TypeTag::Double)]);
        assert_eq!(t.default_value(), "new Double[10]");
        let nested = TypeSeq::from_types(vec![
            Type::sized(TypeTag::Array, 3),
            Type::new(TypeTag::Array),
            Type::new(TypeTag::Integer),
        ]);
        assert_eq!(nested.default_value(), "new Integer[3][]");
        let generic = TypeSeq::from_types(vec![Type::sized(TypeTag::Array, 2), Type::new(TypeTag::Hash), Type::new(TypeTag::Integer)]);
        assert_eq!(generic.default_value(), "new PerlMap[2]");
    }

    #[test]
    fn shape_ignores_capacity() {
        let a = TypeSeq::from_types(vec![Type::sized(TypeTag::Array, 4), Type::new(TypeTag::Integer)]);
        let b = TypeSeq::from_tags(&[TypeTag::Array, TypeTag::Integer]);
        assert!(a.same_shape(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn promotion_picks_wider() {
        assert_eq!(TypeTag::Integer.promote(TypeTag::Double), Some(TypeTag::Double));
        assert_eq!(TypeTag::Long.promote(TypeTag::Integer), Some(TypeTag::Long));
        assert_eq!(TypeTag::String.promote(TypeTag::Integer), None);
    }

    #[test]
    fn display_nests() {
        let t = TypeSeq::from_tags(&[TypeTag::Ref, TypeTag::Array, TypeTag::Integer]);
        assert_eq!(t.to_string(), "ref<array<int>>");
    }
}
