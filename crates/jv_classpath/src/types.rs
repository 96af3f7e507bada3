use serde::{Deserialize, Serialize};
use std::fmt;

pub const OBJECT_CLASS: &str = "java.lang.Object";
pub const STRING_CLASS: &str = "java.lang.String";

/// JVM primitive types. `numeric_rank` follows the widening lattice
/// `byte < short|char < int < long < float < double`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveType {
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Short => "short",
            PrimitiveType::Char => "char",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
        }
    }

    pub fn descriptor(self) -> char {
        match self {
            PrimitiveType::Boolean => 'Z',
            PrimitiveType::Byte => 'B',
            PrimitiveType::Short => 'S',
            PrimitiveType::Char => 'C',
            PrimitiveType::Int => 'I',
            PrimitiveType::Long => 'J',
            PrimitiveType::Float => 'F',
            PrimitiveType::Double => 'D',
        }
    }

    pub fn from_descriptor(tag: u8) -> Option<Self> {
        Some(match tag {
            b'Z' => PrimitiveType::Boolean,
            b'B' => PrimitiveType::Byte,
            b'S' => PrimitiveType::Short,
            b'C' => PrimitiveType::Char,
            b'I' => PrimitiveType::Int,
            b'J' => PrimitiveType::Long,
            b'F' => PrimitiveType::Float,
            b'D' => PrimitiveType::Double,
            _ => return None,
        })
    }

    pub fn numeric_rank(self) -> Option<u8> {
        match self {
            PrimitiveType::Byte => Some(0),
            PrimitiveType::Short | PrimitiveType::Char => Some(1),
            PrimitiveType::Int => Some(2),
            PrimitiveType::Long => Some(3),
            PrimitiveType::Float => Some(4),
            PrimitiveType::Double => Some(5),
            PrimitiveType::Boolean => None,
        }
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            PrimitiveType::Byte
                | PrimitiveType::Short
                | PrimitiveType::Char
                | PrimitiveType::Int
                | PrimitiveType::Long
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(self, PrimitiveType::Float | PrimitiveType::Double)
    }

    pub fn wrapper_class(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "java.lang.Boolean",
            PrimitiveType::Byte => "java.lang.Byte",
            PrimitiveType::Short => "java.lang.Short",
            PrimitiveType::Char => "java.lang.Character",
            PrimitiveType::Int => "java.lang.Integer",
            PrimitiveType::Long => "java.lang.Long",
            PrimitiveType::Float => "java.lang.Float",
            PrimitiveType::Double => "java.lang.Double",
        }
    }

    pub fn from_wrapper(class_name: &str) -> Option<Self> {
        Some(match class_name {
            "java.lang.Boolean" => PrimitiveType::Boolean,
            "java.lang.Byte" => PrimitiveType::Byte,
            "java.lang.Short" => PrimitiveType::Short,
            "java.lang.Character" => PrimitiveType::Char,
            "java.lang.Integer" => PrimitiveType::Int,
            "java.lang.Long" => PrimitiveType::Long,
            "java.lang.Float" => PrimitiveType::Float,
            "java.lang.Double" => PrimitiveType::Double,
            _ => return None,
        })
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Java type as recovered from descriptors and generic signatures.
///
/// Descriptors never carry `type_args` or type variables; those only appear
/// when a member carries a `Signature` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JavaType {
    Primitive(PrimitiveType),
    Reference {
        name: String,
        type_args: Vec<JavaType>,
    },
    Array {
        element: Box<JavaType>,
        dimensions: u8,
    },
    TypeVariable(String),
    Void,
}

impl JavaType {
    pub fn reference(name: impl Into<String>) -> Self {
        JavaType::Reference {
            name: name.into(),
            type_args: Vec::new(),
        }
    }

    pub fn object() -> Self {
        Self::reference(OBJECT_CLASS)
    }

    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            JavaType::Primitive(primitive) => Some(*primitive),
            _ => None,
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            JavaType::Reference { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn type_args(&self) -> &[JavaType] {
        match self {
            JavaType::Reference { type_args, .. } => type_args,
            _ => &[],
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            JavaType::Reference { .. } | JavaType::Array { .. } | JavaType::TypeVariable(_)
        )
    }

    /// Erasure used when comparing a generic signature to its descriptor.
    /// Type variables erase to `java.lang.Object`.
    pub fn erasure(&self) -> JavaType {
        match self {
            JavaType::Reference { name, .. } => JavaType::reference(name.clone()),
            JavaType::Array {
                element,
                dimensions,
            } => JavaType::Array {
                element: Box::new(element.erasure()),
                dimensions: *dimensions,
            },
            JavaType::TypeVariable(_) => JavaType::object(),
            other => other.clone(),
        }
    }

    /// JVM descriptor of the erased type (`I`, `Ljava/lang/String;`, `[J`).
    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            JavaType::Primitive(primitive) => out.push(primitive.descriptor()),
            JavaType::Reference { name, .. } => {
                out.push('L');
                out.push_str(&name.replace('.', "/"));
                out.push(';');
            }
            JavaType::Array {
                element,
                dimensions,
            } => {
                for _ in 0..*dimensions {
                    out.push('[');
                }
                element.write_descriptor(out);
            }
            JavaType::TypeVariable(_) => out.push_str("Ljava/lang/Object;"),
            JavaType::Void => out.push('V'),
        }
    }
}

impl fmt::Display for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JavaType::Primitive(primitive) => write!(f, "{primitive}"),
            JavaType::Reference { name, type_args } => {
                f.write_str(name)?;
                if !type_args.is_empty() {
                    f.write_str("<")?;
                    for (index, arg) in type_args.iter().enumerate() {
                        if index > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            JavaType::Array {
                element,
                dimensions,
            } => {
                write!(f, "{element}")?;
                for _ in 0..*dimensions {
                    f.write_str("[]")?;
                }
                Ok(())
            }
            JavaType::TypeVariable(name) => f.write_str(name),
            JavaType::Void => f.write_str("void"),
        }
    }
}

/// Render a method descriptor from erased parameter and return types.
pub fn method_descriptor(parameters: &[JavaType], return_type: &JavaType) -> String {
    let mut out = String::from("(");
    for parameter in parameters {
        out.push_str(&parameter.descriptor());
    }
    out.push(')');
    out.push_str(&return_type.descriptor());
    out
}
