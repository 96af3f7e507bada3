use crate::hierarchy::TypeHierarchy;
use crate::resolver::ResolvedBinding;
use crate::rules::{bounded, LIST_CLASS, MAP_CLASS, OPTIONAL_CLASS, SET_CLASS};
use crate::value::{InteropValue, JvmValue};
use jv_classpath::{JavaType, PrimitiveType, OBJECT_CLASS};
use jv_isolation::ClassView;
use thiserror::Error;

/// Failure to turn one runtime value into its declared JVM type. `path`
/// locates the value (`argument 1`, `argument 0[2]`, `argument 2{key}`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdaptError {
    #[error("{path}: numeric conversion from {from} to {to} requires narrowing")]
    Narrowing {
        path: String,
        from: String,
        to: String,
    },
    #[error("{path}: numeric value {value} is out of range for {to}")]
    OutOfRange {
        path: String,
        value: String,
        to: String,
    },
    #[error("{path}: `{value}` is not a constant of enum `{expected}`")]
    EnumConstant {
        path: String,
        expected: String,
        value: String,
    },
    #[error("{path}: cannot convert {value} to {expected}")]
    Incompatible {
        path: String,
        expected: String,
        value: String,
    },
}

impl AdaptError {
    pub fn is_numeric(&self) -> bool {
        matches!(self, AdaptError::Narrowing { .. } | AdaptError::OutOfRange { .. })
    }
}

/// Converts program values into JVM arguments for a resolved binding.
pub struct ArgumentAdapter<'a> {
    hierarchy: TypeHierarchy<'a>,
}

impl<'a> ArgumentAdapter<'a> {
    pub fn new(view: &'a ClassView) -> Self {
        Self {
            hierarchy: TypeHierarchy::new(view),
        }
    }

    pub fn adapt_arguments(
        &self,
        binding: &ResolvedBinding,
        arguments: &[InteropValue],
    ) -> Result<Vec<JvmValue>, AdaptError> {
        let parameters = &binding.parameters;
        if !binding.varargs {
            return arguments
                .iter()
                .zip(parameters)
                .enumerate()
                .map(|(index, (value, parameter))| {
                    self.adapt(value, parameter, &format!("argument {index}"))
                })
                .collect();
        }

        let fixed = parameters.len().saturating_sub(1);
        let mut adapted = Vec::with_capacity(parameters.len());
        for (index, (value, parameter)) in arguments.iter().zip(&parameters[..fixed]).enumerate() {
            adapted.push(self.adapt(value, parameter, &format!("argument {index}"))?);
        }
        let component = parameters
            .last()
            .map(component_type)
            .unwrap_or_else(JavaType::object);
        let items = arguments[fixed.min(arguments.len())..]
            .iter()
            .enumerate()
            .map(|(offset, value)| {
                self.adapt(value, &component, &format!("argument {}", fixed + offset))
            })
            .collect::<Result<Vec<_>, _>>()?;
        adapted.push(JvmValue::Array { component, items });
        Ok(adapted)
    }

    /// Receivers pass through as references.
    pub fn receiver(&self, value: &InteropValue) -> JvmValue {
        match value {
            InteropValue::Object { class, handle } => JvmValue::Object {
                class: class.clone(),
                handle: *handle,
            },
            _ => JvmValue::Null,
        }
    }

    pub fn adapt(
        &self,
        value: &InteropValue,
        target: &JavaType,
        path: &str,
    ) -> Result<JvmValue, AdaptError> {
        match target {
            JavaType::Primitive(primitive) => self.adapt_primitive(value, *primitive, path),
            JavaType::Reference { name, type_args } => {
                self.adapt_reference(value, name, type_args, target, path)
            }
            JavaType::Array { .. } => match value {
                InteropValue::Null => Ok(JvmValue::Null),
                InteropValue::List(items) | InteropValue::Set(items) => {
                    let component = component_type(target);
                    let items = self.adapt_elements(items, &component, path)?;
                    Ok(JvmValue::Array { component, items })
                }
                other => Err(incompatible(path, target, other)),
            },
            JavaType::TypeVariable(_) => self.adapt(value, &JavaType::object(), path),
            JavaType::Void => Err(incompatible(path, target, value)),
        }
    }

    fn adapt_primitive(
        &self,
        value: &InteropValue,
        primitive: PrimitiveType,
        path: &str,
    ) -> Result<JvmValue, AdaptError> {
        let declared = JavaType::Primitive(primitive);
        match value {
            InteropValue::Bool(flag) if primitive == PrimitiveType::Boolean => {
                Ok(JvmValue::Boolean(*flag))
            }
            InteropValue::Char(ch) => match primitive {
                PrimitiveType::Char => Ok(JvmValue::Char(*ch)),
                PrimitiveType::Int => Ok(JvmValue::Int(*ch as i32)),
                PrimitiveType::Long => Ok(JvmValue::Long(i64::from(u32::from(*ch)))),
                PrimitiveType::Float => Ok(JvmValue::Float(u32::from(*ch) as f32)),
                PrimitiveType::Double => Ok(JvmValue::Double(f64::from(u32::from(*ch)))),
                _ => Err(AdaptError::Narrowing {
                    path: path.to_string(),
                    from: "char".to_string(),
                    to: primitive.to_string(),
                }),
            },
            InteropValue::Number(number) => convert_number(*number, "double", primitive, path),
            InteropValue::Long(number) => convert_long(*number, primitive, path),
            // Wrapper objects are unboxed by the host.
            InteropValue::Object { class, handle } if PrimitiveType::from_wrapper(class).is_some() => {
                Ok(JvmValue::Object {
                    class: class.clone(),
                    handle: *handle,
                })
            }
            other => Err(incompatible(path, &declared, other)),
        }
    }

    fn adapt_reference(
        &self,
        value: &InteropValue,
        class: &str,
        type_args: &[JavaType],
        declared: &JavaType,
        path: &str,
    ) -> Result<JvmValue, AdaptError> {
        if class == OPTIONAL_CLASS {
            return match value {
                InteropValue::Null => Ok(JvmValue::Optional(None)),
                InteropValue::Object { class: actual, .. } if actual == OPTIONAL_CLASS => {
                    Ok(self.receiver(value))
                }
                other => {
                    let inner = type_args.first().map(bounded).unwrap_or_else(JavaType::object);
                    let adapted = self.adapt(other, &inner, path)?;
                    Ok(JvmValue::Optional(Some(Box::new(adapted))))
                }
            };
        }
        if let Some(primitive) = PrimitiveType::from_wrapper(class) {
            return match value {
                InteropValue::Null => Ok(JvmValue::Null),
                InteropValue::Object { .. } => Ok(self.receiver(value)),
                other => {
                    let unboxed = self.adapt_primitive(other, primitive, path)?;
                    Ok(JvmValue::Boxed(Box::new(unboxed)))
                }
            };
        }

        match value {
            InteropValue::Null => Ok(JvmValue::Null),
            InteropValue::String(text) => {
                if self.hierarchy.is_enum(class) {
                    return self.enum_constant(class, text, path);
                }
                Ok(JvmValue::String(text.clone()))
            }
            InteropValue::List(items) | InteropValue::Set(items) => {
                let element = type_args.first().map(bounded).unwrap_or_else(JavaType::object);
                let items = self.adapt_elements(items, &element, path)?;
                let as_set = class == SET_CLASS
                    || (matches!(value, InteropValue::Set(_)) && class != LIST_CLASS);
                Ok(if as_set {
                    JvmValue::Set(dedup(items))
                } else {
                    JvmValue::List(items)
                })
            }
            InteropValue::Map(entries) => {
                if class != MAP_CLASS && class != OBJECT_CLASS {
                    return Err(incompatible(path, declared, value));
                }
                let key_type = type_args.first().map(bounded).unwrap_or_else(JavaType::object);
                let value_type = type_args.get(1).map(bounded).unwrap_or_else(JavaType::object);
                entries
                    .iter()
                    .map(|(key, entry)| {
                        let key_path = format!("{path}{{{}}}", key.describe());
                        Ok((
                            self.adapt(key, &key_type, &key_path)?,
                            self.adapt(entry, &value_type, &key_path)?,
                        ))
                    })
                    .collect::<Result<Vec<_>, AdaptError>>()
                    .map(JvmValue::Map)
            }
            InteropValue::Bool(flag) => Ok(JvmValue::Boxed(Box::new(JvmValue::Boolean(*flag)))),
            InteropValue::Char(ch) => Ok(JvmValue::Boxed(Box::new(JvmValue::Char(*ch)))),
            InteropValue::Long(number) => Ok(JvmValue::Boxed(Box::new(JvmValue::Long(*number)))),
            InteropValue::Number(number) => {
                let natural = match value.shape().primitive() {
                    Some(PrimitiveType::Int) => JvmValue::Int(*number as i32),
                    Some(PrimitiveType::Long) => JvmValue::Long(*number as i64),
                    _ => JvmValue::Double(*number),
                };
                Ok(JvmValue::Boxed(Box::new(natural)))
            }
            InteropValue::Object { .. } => Ok(self.receiver(value)),
        }
    }

    fn enum_constant(&self, class: &str, name: &str, path: &str) -> Result<JvmValue, AdaptError> {
        let constants = self.hierarchy.enum_constants(class);
        if constants.iter().any(|constant| constant == name) {
            Ok(JvmValue::Enum {
                class: class.to_string(),
                constant: name.to_string(),
            })
        } else {
            Err(AdaptError::EnumConstant {
                path: path.to_string(),
                expected: class.to_string(),
                value: name.to_string(),
            })
        }
    }

    fn adapt_elements(
        &self,
        items: &[InteropValue],
        element: &JavaType,
        path: &str,
    ) -> Result<Vec<JvmValue>, AdaptError> {
        items
            .iter()
            .enumerate()
            .map(|(index, item)| self.adapt(item, element, &format!("{path}[{index}]")))
            .collect()
    }
}

fn component_type(array: &JavaType) -> JavaType {
    match array {
        JavaType::Array {
            element,
            dimensions,
        } if *dimensions > 1 => JavaType::Array {
            element: element.clone(),
            dimensions: dimensions - 1,
        },
        JavaType::Array { element, .. } => element.as_ref().clone(),
        _ => JavaType::object(),
    }
}

fn dedup(items: Vec<JvmValue>) -> Vec<JvmValue> {
    let mut unique: Vec<JvmValue> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    unique
}

fn incompatible(path: &str, expected: &JavaType, value: &InteropValue) -> AdaptError {
    AdaptError::Incompatible {
        path: path.to_string(),
        expected: expected.to_string(),
        value: value.describe(),
    }
}

fn convert_number(
    number: f64,
    source: &str,
    target: PrimitiveType,
    path: &str,
) -> Result<JvmValue, AdaptError> {
    let narrowing = || AdaptError::Narrowing {
        path: path.to_string(),
        from: source.to_string(),
        to: target.to_string(),
    };
    let out_of_range = || AdaptError::OutOfRange {
        path: path.to_string(),
        value: number.to_string(),
        to: target.to_string(),
    };
    if !number.is_finite() && target != PrimitiveType::Double {
        return Err(out_of_range());
    }
    let integral = number.fract() == 0.0;
    match target {
        PrimitiveType::Double => Ok(JvmValue::Double(number)),
        PrimitiveType::Float => {
            if number.abs() > f64::from(f32::MAX) {
                return Err(out_of_range());
            }
            Ok(JvmValue::Float(number as f32))
        }
        PrimitiveType::Boolean | PrimitiveType::Char => Err(narrowing()),
        _ if !integral => Err(narrowing()),
        PrimitiveType::Long => {
            if number < i64::MIN as f64 || number >= i64::MAX as f64 {
                return Err(out_of_range());
            }
            Ok(JvmValue::Long(number as i64))
        }
        PrimitiveType::Int => i32::try_from(number as i64)
            .map(JvmValue::Int)
            .map_err(|_| out_of_range()),
        PrimitiveType::Short => i16::try_from(number as i64)
            .map(JvmValue::Short)
            .map_err(|_| out_of_range()),
        PrimitiveType::Byte => i8::try_from(number as i64)
            .map(JvmValue::Byte)
            .map_err(|_| out_of_range()),
    }
}

fn convert_long(number: i64, target: PrimitiveType, path: &str) -> Result<JvmValue, AdaptError> {
    let out_of_range = || AdaptError::OutOfRange {
        path: path.to_string(),
        value: number.to_string(),
        to: target.to_string(),
    };
    match target {
        PrimitiveType::Long => Ok(JvmValue::Long(number)),
        PrimitiveType::Double => Ok(JvmValue::Double(number as f64)),
        PrimitiveType::Float => Ok(JvmValue::Float(number as f32)),
        PrimitiveType::Int => i32::try_from(number)
            .map(JvmValue::Int)
            .map_err(|_| out_of_range()),
        PrimitiveType::Short => i16::try_from(number)
            .map(JvmValue::Short)
            .map_err(|_| out_of_range()),
        PrimitiveType::Byte => i8::try_from(number)
            .map(JvmValue::Byte)
            .map_err(|_| out_of_range()),
        PrimitiveType::Boolean | PrimitiveType::Char => Err(AdaptError::Narrowing {
            path: path.to_string(),
            from: "long".to_string(),
            to: target.to_string(),
        }),
    }
}
