//! Field and method descriptors (JVMS 4.3) parsed into [`JvmType`].
use nom::{
    branch::alt,
    bytes::complete::take_till1,
    character::complete::{anychar, char},
    combinator::{all_consuming, map, map_opt},
    multi::many0,
    sequence::{delimited, pair, preceded},
    IResult,
};

/// Static type of a value, local or descriptor entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JvmType {
    Int,
    Long,
    Float,
    Double,
    Byte,
    Char,
    Short,
    Boolean,
    Void,
    /// Internal class name, e.g. `java/lang/String`.
    Reference(String),
    Array(Box<JvmType>),
    /// The type of the `null` literal.
    Null,
    Unknown,
}

/// Coarse classification the structuring code branches on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Boolean,
    IntLike,
    Long,
    Float,
    Double,
    Reference,
    Void,
    Unknown,
}

/// Base types: descriptor character, source keyword and `newarray` code
/// (0 for `void`).
static BASE_TYPES: [(JvmType, char, &str, u8); 9] = [
    (JvmType::Boolean, 'Z', "boolean", 4),
    (JvmType::Char, 'C', "char", 5),
    (JvmType::Float, 'F', "float", 6),
    (JvmType::Double, 'D', "double", 7),
    (JvmType::Byte, 'B', "byte", 8),
    (JvmType::Short, 'S', "short", 9),
    (JvmType::Int, 'I', "int", 10),
    (JvmType::Long, 'J', "long", 11),
    (JvmType::Void, 'V', "void", 0),
];

fn base_entry(ty: &JvmType) -> Option<&'static (JvmType, char, &'static str, u8)> {
    BASE_TYPES.iter().find(|(base, ..)| base == ty)
}

impl JvmType {
    /// Long and double take two local slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, JvmType::Long | JvmType::Double)
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            JvmType::Boolean => TypeKind::Boolean,
            JvmType::Int | JvmType::Byte | JvmType::Char | JvmType::Short => TypeKind::IntLike,
            JvmType::Long => TypeKind::Long,
            JvmType::Float => TypeKind::Float,
            JvmType::Double => TypeKind::Double,
            JvmType::Reference(_) | JvmType::Array(_) | JvmType::Null => TypeKind::Reference,
            JvmType::Void => TypeKind::Void,
            JvmType::Unknown => TypeKind::Unknown,
        }
    }

    /// True if a value of `other` can live in the same local slot as `self`
    /// without being a different variable. Booleans share the int category.
    pub fn same_category(&self, other: &JvmType) -> bool {
        fn category(kind: TypeKind) -> TypeKind {
            match kind {
                TypeKind::Boolean => TypeKind::IntLike,
                other => other,
            }
        }
        let (a, b) = (self.kind(), other.kind());
        a == TypeKind::Unknown || b == TypeKind::Unknown || category(a) == category(b)
    }

    /// Descriptor form; types with no descriptor of their own map to `Object`.
    pub fn to_descriptor(&self) -> String {
        match self {
            JvmType::Reference(name) => format!("L{};", name),
            JvmType::Array(inner) => format!("[{}", inner.to_descriptor()),
            JvmType::Null | JvmType::Unknown => "Ljava/lang/Object;".into(),
            base => base_entry(base).map(|(_, code, ..)| code.to_string()).unwrap_or_default(),
        }
    }

    /// Unqualified source name, `String[]` for `[Ljava/lang/String;`.
    pub fn simple_name(&self) -> String {
        match self {
            JvmType::Reference(name) => simple_class_name(name).to_string(),
            JvmType::Array(inner) => format!("{}[]", inner.simple_name()),
            JvmType::Null => "null".into(),
            JvmType::Unknown => "var".into(),
            base => base_entry(base).map(|(_, _, keyword, _)| keyword.to_string()).unwrap_or_default(),
        }
    }
}

fn base_for_code(code: char) -> Option<JvmType> {
    BASE_TYPES.iter().find(|(_, c, ..)| *c == code).map(|(ty, ..)| ty.clone())
}

fn base_type(input: &str) -> IResult<&str, JvmType> {
    map_opt(anychar, |c| base_for_code(c).filter(|ty| *ty != JvmType::Void))(input)
}

fn field_type(input: &str) -> IResult<&str, JvmType> {
    alt((
        map(delimited(char('L'), take_till1(|c| c == ';'), char(';')), |name: &str| {
            JvmType::Reference(name.to_string())
        }),
        map(preceded(char('['), field_type), |inner| JvmType::Array(Box::new(inner))),
        base_type,
    ))(input)
}

fn return_type(input: &str) -> IResult<&str, JvmType> {
    alt((field_type, map_opt(anychar, base_for_code)))(input)
}

fn method_descriptor(input: &str) -> IResult<&str, (Vec<JvmType>, JvmType)> {
    pair(delimited(char('('), many0(field_type), char(')')), return_type)(input)
}

/// Parses a field descriptor, or `V`.
pub fn parse_type_descriptor(desc: &str) -> Option<JvmType> {
    all_consuming(return_type)(desc).ok().map(|(_, ty)| ty)
}

/// Parses `(params)ret` into the parameter types and the return type.
pub fn parse_method_descriptor(desc: &str) -> Option<(Vec<JvmType>, JvmType)> {
    all_consuming(method_descriptor)(desc).ok().map(|(_, parsed)| parsed)
}

/// Type of a `Class` constant operand, which is either an internal class
/// name or, for arrays, a field descriptor.
pub fn class_operand_type(operand: &str) -> JvmType {
    if operand.starts_with('[') {
        parse_type_descriptor(operand).unwrap_or(JvmType::Unknown)
    } else {
        JvmType::Reference(operand.to_string())
    }
}

/// `String` for `java/lang/String`.
pub fn simple_class_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Element type of a `newarray` operand.
pub fn newarray_type(atype: u8) -> JvmType {
    BASE_TYPES
        .iter()
        .find(|(_, _, _, code)| *code == atype && atype != 0)
        .map(|(ty, ..)| ty.clone())
        .unwrap_or(JvmType::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(name: &str) -> JvmType {
        JvmType::Reference(name.into())
    }

    #[test]
    fn test_every_base_type_round_trips() {
        for (ty, code, ..) in BASE_TYPES.iter() {
            assert_eq!(parse_type_descriptor(&code.to_string()).as_ref(), Some(ty));
            assert_eq!(ty.to_descriptor(), code.to_string());
        }
    }

    #[test]
    fn test_nested_array_of_references() {
        let ty = parse_type_descriptor("[[Ljava/util/List;").unwrap();
        assert_eq!(ty, JvmType::Array(Box::new(JvmType::Array(Box::new(reference("java/util/List"))))));
        assert_eq!(ty.simple_name(), "List[][]");
        assert_eq!(parse_type_descriptor("Ljava/util/List"), None);
        assert_eq!(parse_type_descriptor("L;"), None);
    }

    #[test]
    fn test_method_with_wide_and_reference_params() {
        let (params, ret) = parse_method_descriptor("(JLjava/lang/Object;D[I)Z").unwrap();
        assert_eq!(
            params,
            vec![
                JvmType::Long,
                reference("java/lang/Object"),
                JvmType::Double,
                JvmType::Array(Box::new(JvmType::Int)),
            ]
        );
        assert_eq!(params.iter().filter(|p| p.is_wide()).count(), 2);
        assert_eq!(ret, JvmType::Boolean);
        assert_eq!(parse_method_descriptor("()V"), Some((vec![], JvmType::Void)));
    }

    #[test]
    fn test_void_is_only_a_return_type() {
        assert_eq!(parse_method_descriptor("(V)V"), None);
        assert_eq!(parse_type_descriptor("[V"), None);
        assert_eq!(parse_method_descriptor("(I"), None);
        assert_eq!(parse_method_descriptor("()VV"), None);
        assert_eq!(parse_method_descriptor("II)V"), None);
    }

    #[test]
    fn test_slot_categories() {
        assert!(JvmType::Boolean.same_category(&JvmType::Int));
        assert!(JvmType::Unknown.same_category(&JvmType::Long));
        assert!(!JvmType::Int.same_category(&reference("java/lang/String")));
        assert!(JvmType::Null.same_category(&JvmType::Array(Box::new(JvmType::Int))));
    }

    #[test]
    fn test_operand_helpers() {
        assert_eq!(simple_class_name("java/lang/String"), "String");
        assert_eq!(simple_class_name("Foo"), "Foo");
        assert_eq!(class_operand_type("[I"), JvmType::Array(Box::new(JvmType::Int)));
        assert_eq!(class_operand_type("java/lang/String"), reference("java/lang/String"));
        assert_eq!(newarray_type(10), JvmType::Int);
        assert_eq!(newarray_type(4), JvmType::Boolean);
        assert_eq!(newarray_type(0), JvmType::Unknown);
    }
}
