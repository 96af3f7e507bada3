use jv_classpath::{JavaType, PrimitiveType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dynamic argument and result model on the program side of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum InteropValue {
    Null,
    Bool(bool),
    Number(f64),
    Long(i64),
    Char(char),
    String(String),
    List(Vec<InteropValue>),
    Set(Vec<InteropValue>),
    Map(Vec<(InteropValue, InteropValue)>),
    Object { class: String, handle: u64 },
}

impl InteropValue {
    pub fn string(value: impl Into<String>) -> Self {
        InteropValue::String(value.into())
    }

    pub fn object(class: impl Into<String>, handle: u64) -> Self {
        InteropValue::Object {
            class: class.into(),
            handle,
        }
    }

    pub fn shape(&self) -> ArgumentShape {
        match self {
            InteropValue::Null => ArgumentShape::Null,
            InteropValue::Bool(_) => ArgumentShape::Bool,
            InteropValue::Number(number) => number_shape(*number),
            InteropValue::Long(_) => ArgumentShape::Long,
            InteropValue::Char(_) => ArgumentShape::Char,
            InteropValue::String(_) => ArgumentShape::String,
            InteropValue::List(_) => ArgumentShape::List,
            InteropValue::Set(_) => ArgumentShape::Set,
            InteropValue::Map(_) => ArgumentShape::Map,
            InteropValue::Object { class, .. } => ArgumentShape::Object(class.clone()),
        }
    }

    /// Short description used in conversion messages.
    pub fn describe(&self) -> String {
        match self {
            InteropValue::Null => "null".to_string(),
            InteropValue::Bool(value) => value.to_string(),
            InteropValue::Number(value) => value.to_string(),
            InteropValue::Long(value) => format!("{value}L"),
            InteropValue::Char(value) => format!("'{value}'"),
            InteropValue::String(value) => format!("\"{value}\""),
            InteropValue::List(items) => format!("list[{}]", items.len()),
            InteropValue::Set(items) => format!("set[{}]", items.len()),
            InteropValue::Map(entries) => format!("map[{}]", entries.len()),
            InteropValue::Object { class, handle } => format!("{class}@{handle}"),
        }
    }
}

/// Integral numbers in int range are `int`, then `long`; everything else is `double`.
fn number_shape(number: f64) -> ArgumentShape {
    if number.is_finite() && number.fract() == 0.0 {
        if number >= f64::from(i32::MIN) && number <= f64::from(i32::MAX) {
            return ArgumentShape::Int;
        }
        // i64::MAX rounds up to 2^63 as f64, so the upper bound is exclusive.
        if number >= i64::MIN as f64 && number < i64::MAX as f64 {
            return ArgumentShape::Long;
        }
    }
    ArgumentShape::Double
}

/// Value shape that overload resolution depends on. Part of the binding cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentShape {
    Null,
    Bool,
    Int,
    Long,
    Double,
    Char,
    String,
    List,
    Set,
    Map,
    Object(String),
}

impl ArgumentShape {
    /// Primitive type a value of this shape starts from.
    pub fn primitive(&self) -> Option<PrimitiveType> {
        match self {
            ArgumentShape::Bool => Some(PrimitiveType::Boolean),
            ArgumentShape::Int => Some(PrimitiveType::Int),
            ArgumentShape::Long => Some(PrimitiveType::Long),
            ArgumentShape::Double => Some(PrimitiveType::Double),
            ArgumentShape::Char => Some(PrimitiveType::Char),
            ArgumentShape::Object(class) => PrimitiveType::from_wrapper(class),
            _ => None,
        }
    }
}

impl fmt::Display for ArgumentShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentShape::Null => f.write_str("null"),
            ArgumentShape::Bool => f.write_str("boolean"),
            ArgumentShape::Int => f.write_str("int"),
            ArgumentShape::Long => f.write_str("long"),
            ArgumentShape::Double => f.write_str("double"),
            ArgumentShape::Char => f.write_str("char"),
            ArgumentShape::String => f.write_str("string"),
            ArgumentShape::List => f.write_str("list"),
            ArgumentShape::Set => f.write_str("set"),
            ArgumentShape::Map => f.write_str("map"),
            ArgumentShape::Object(class) => f.write_str(class),
        }
    }
}

pub(crate) fn describe_shapes(shapes: &[ArgumentShape]) -> String {
    format!(
        "({})",
        shapes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    )
}

/// Argument after adaptation to a declared JVM parameter type.
#[derive(Debug, Clone, PartialEq)]
pub enum JvmValue {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// A primitive boxed into its wrapper class.
    Boxed(Box<JvmValue>),
    String(String),
    Enum { class: String, constant: String },
    List(Vec<JvmValue>),
    Set(Vec<JvmValue>),
    Map(Vec<(JvmValue, JvmValue)>),
    Optional(Option<Box<JvmValue>>),
    Array { component: JavaType, items: Vec<JvmValue> },
    Object { class: String, handle: u64 },
}

impl JvmValue {
    /// Map a host result back onto the program value model.
    pub fn into_interop(self) -> InteropValue {
        match self {
            JvmValue::Null | JvmValue::Optional(None) => InteropValue::Null,
            JvmValue::Boolean(value) => InteropValue::Bool(value),
            JvmValue::Byte(value) => InteropValue::Number(f64::from(value)),
            JvmValue::Short(value) => InteropValue::Number(f64::from(value)),
            JvmValue::Char(value) => InteropValue::Char(value),
            JvmValue::Int(value) => InteropValue::Number(f64::from(value)),
            JvmValue::Long(value) => InteropValue::Long(value),
            JvmValue::Float(value) => InteropValue::Number(f64::from(value)),
            JvmValue::Double(value) => InteropValue::Number(value),
            JvmValue::Boxed(inner) => inner.into_interop(),
            JvmValue::Optional(Some(inner)) => inner.into_interop(),
            JvmValue::String(value) => InteropValue::String(value),
            JvmValue::Enum { constant, .. } => InteropValue::String(constant),
            JvmValue::List(items) | JvmValue::Array { items, .. } => {
                InteropValue::List(items.into_iter().map(JvmValue::into_interop).collect())
            }
            JvmValue::Set(items) => {
                InteropValue::Set(items.into_iter().map(JvmValue::into_interop).collect())
            }
            JvmValue::Map(entries) => InteropValue::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.into_interop(), value.into_interop()))
                    .collect(),
            ),
            JvmValue::Object { class, handle } => InteropValue::Object { class, handle },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(3.0, ArgumentShape::Int ; "small integral")]
    #[test_case(-2147483648.0, ArgumentShape::Int ; "int min")]
    #[test_case(2147483648.0, ArgumentShape::Long ; "past int max")]
    #[test_case(1.5, ArgumentShape::Double ; "fraction")]
    #[test_case(1e300, ArgumentShape::Double ; "beyond long")]
    #[test_case(f64::NAN, ArgumentShape::Double ; "nan")]
    fn number_shapes(value: f64, expected: ArgumentShape) {
        assert_eq!(InteropValue::Number(value).shape(), expected);
    }

    #[test]
    fn wrapper_objects_expose_their_primitive() {
        let shape = InteropValue::object("java.lang.Integer", 7).shape();
        assert_eq!(shape.primitive(), Some(PrimitiveType::Int));
        assert_eq!(ArgumentShape::String.primitive(), None);
    }

    #[test]
    fn results_map_back_to_program_values() {
        let result = JvmValue::List(vec![
            JvmValue::Boxed(Box::new(JvmValue::Int(1))),
            JvmValue::Enum {
                class: "demo.Color".into(),
                constant: "RED".into(),
            },
        ]);
        assert_eq!(
            result.into_interop(),
            InteropValue::List(vec![InteropValue::Number(1.0), InteropValue::string("RED")])
        );
    }
}
