//! Conversion rule table used to rank overload candidates.
//!
//! Every argument-to-parameter conversion is classified by one rule. Rules
//! are grouped in phases: a candidate that needs only phase-0 rules always
//! beats one that needs boxing (phase 1), which beats structural adaptation
//! (phase 2). Within a phase the summed cost decides.

use crate::hierarchy::TypeHierarchy;
use crate::value::ArgumentShape;
use jv_classpath::{JavaType, PrimitiveType, OBJECT_CLASS, STRING_CLASS};
use serde::Serialize;
use std::fmt;

pub const LIST_CLASS: &str = "java.util.List";
pub const SET_CLASS: &str = "java.util.Set";
pub const MAP_CLASS: &str = "java.util.Map";
pub const OPTIONAL_CLASS: &str = "java.util.Optional";
const COLLECTION_CLASS: &str = "java.util.Collection";
const ITERABLE_CLASS: &str = "java.lang.Iterable";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversionRule {
    Identity,
    PrimitiveWidening,
    ReferenceWidening,
    NullReference,
    StringReference,
    Boxing,
    Unboxing,
    EnumConstant,
    Sequence,
    Mapping,
    OptionalWrap,
    Varargs,
}

impl ConversionRule {
    pub fn phase(self) -> u8 {
        match self {
            ConversionRule::Identity
            | ConversionRule::PrimitiveWidening
            | ConversionRule::ReferenceWidening
            | ConversionRule::NullReference
            | ConversionRule::StringReference => 0,
            ConversionRule::Boxing | ConversionRule::Unboxing => 1,
            ConversionRule::EnumConstant
            | ConversionRule::Sequence
            | ConversionRule::Mapping
            | ConversionRule::OptionalWrap
            | ConversionRule::Varargs => 2,
        }
    }

    /// Fixed part of the cost; widening distances are added on top.
    pub fn base_cost(self) -> u32 {
        match self {
            ConversionRule::Identity | ConversionRule::StringReference => 0,
            ConversionRule::PrimitiveWidening
            | ConversionRule::ReferenceWidening
            | ConversionRule::NullReference
            | ConversionRule::Boxing
            | ConversionRule::Unboxing
            | ConversionRule::EnumConstant
            | ConversionRule::Sequence
            | ConversionRule::Mapping
            | ConversionRule::Varargs => 1,
            ConversionRule::OptionalWrap => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConversionRule::Identity => "identity",
            ConversionRule::PrimitiveWidening => "primitive-widening",
            ConversionRule::ReferenceWidening => "reference-widening",
            ConversionRule::NullReference => "null-reference",
            ConversionRule::StringReference => "string-reference",
            ConversionRule::Boxing => "boxing",
            ConversionRule::Unboxing => "unboxing",
            ConversionRule::EnumConstant => "enum-constant",
            ConversionRule::Sequence => "sequence",
            ConversionRule::Mapping => "mapping",
            ConversionRule::OptionalWrap => "optional-wrap",
            ConversionRule::Varargs => "varargs",
        }
    }
}

impl fmt::Display for ConversionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering key of a conversion or of a whole candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ConversionCost {
    pub phase: u8,
    pub cost: u32,
}

impl ConversionCost {
    /// Phases combine by maximum, costs by sum.
    pub fn combine(self, other: ConversionCost) -> ConversionCost {
        ConversionCost {
            phase: self.phase.max(other.phase),
            cost: self.cost + other.cost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Conversion {
    pub rule: ConversionRule,
    pub cost: ConversionCost,
}

impl Conversion {
    fn new(rule: ConversionRule, extra: u32) -> Self {
        Self {
            rule,
            cost: ConversionCost {
                phase: rule.phase(),
                cost: rule.base_cost() + extra,
            },
        }
    }
}

/// Why a shape cannot reach a parameter type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    Narrowing { from: String, to: String },
    Incompatible { reason: String },
}

impl Mismatch {
    fn incompatible(shape: &ArgumentShape, target: &JavaType) -> Self {
        Mismatch::Incompatible {
            reason: format!("{shape} is not assignable to {target}"),
        }
    }

    pub fn is_narrowing(&self) -> bool {
        matches!(self, Mismatch::Narrowing { .. })
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::Narrowing { from, to } => {
                write!(f, "numeric conversion from {from} to {to} requires narrowing")
            }
            Mismatch::Incompatible { reason } => f.write_str(reason),
        }
    }
}

/// Classify how a value of `shape` reaches `target`.
pub fn classify(
    shape: &ArgumentShape,
    target: &JavaType,
    hierarchy: &TypeHierarchy<'_>,
) -> Result<Conversion, Mismatch> {
    match target {
        JavaType::Primitive(primitive) => classify_primitive(shape, *primitive, target),
        JavaType::Reference { name, type_args } => {
            classify_reference(shape, name, type_args, target, hierarchy)
        }
        JavaType::Array { .. } => match shape {
            ArgumentShape::Null => Ok(Conversion::new(ConversionRule::NullReference, 0)),
            ArgumentShape::List | ArgumentShape::Set => {
                Ok(Conversion::new(ConversionRule::Sequence, 1))
            }
            _ => Err(Mismatch::incompatible(shape, target)),
        },
        JavaType::TypeVariable(_) => classify_reference(shape, OBJECT_CLASS, &[], target, hierarchy),
        JavaType::Void => Err(Mismatch::incompatible(shape, target)),
    }
}

fn classify_primitive(
    shape: &ArgumentShape,
    target: PrimitiveType,
    declared: &JavaType,
) -> Result<Conversion, Mismatch> {
    let (source, rule_for_exact) = match shape {
        ArgumentShape::Object(_) => match shape.primitive() {
            Some(source) => (source, ConversionRule::Unboxing),
            None => return Err(Mismatch::incompatible(shape, declared)),
        },
        ArgumentShape::Null => {
            return Err(Mismatch::Incompatible {
                reason: format!("null cannot be passed as primitive {target}"),
            })
        }
        _ => match shape.primitive() {
            Some(source) => (source, ConversionRule::Identity),
            None => return Err(Mismatch::incompatible(shape, declared)),
        },
    };

    if source == target {
        return Ok(Conversion::new(rule_for_exact, 0));
    }
    let distance = widening_distance(source, target)?;
    let rule = match rule_for_exact {
        ConversionRule::Unboxing => ConversionRule::Unboxing,
        _ => ConversionRule::PrimitiveWidening,
    };
    Ok(Conversion::new(rule, distance))
}

/// Rank distance of a legal primitive widening.
pub(crate) fn widening_distance(source: PrimitiveType, target: PrimitiveType) -> Result<u32, Mismatch> {
    let narrowing = || Mismatch::Narrowing {
        from: source.to_string(),
        to: target.to_string(),
    };
    let (Some(from), Some(to)) = (source.numeric_rank(), target.numeric_rank()) else {
        return Err(Mismatch::Incompatible {
            reason: format!("{source} is not convertible to {target}"),
        });
    };
    if (source.is_floating() && target.is_integral()) || to <= from {
        return Err(narrowing());
    }
    // Nothing widens into char.
    if target == PrimitiveType::Char {
        return Err(narrowing());
    }
    Ok(u32::from(to - from))
}

fn classify_reference(
    shape: &ArgumentShape,
    class: &str,
    type_args: &[JavaType],
    declared: &JavaType,
    hierarchy: &TypeHierarchy<'_>,
) -> Result<Conversion, Mismatch> {
    if class == OPTIONAL_CLASS && !matches!(shape, ArgumentShape::Object(name) if name == OPTIONAL_CLASS) {
        if *shape == ArgumentShape::Null {
            return Ok(Conversion::new(ConversionRule::OptionalWrap, 0));
        }
        let inner = match type_args.first() {
            Some(inner) => classify(shape, &bounded(inner), hierarchy)?,
            None => Conversion::new(ConversionRule::Identity, 0),
        };
        return Ok(Conversion::new(ConversionRule::OptionalWrap, inner.cost.cost));
    }

    match shape {
        ArgumentShape::Null => Ok(Conversion::new(ConversionRule::NullReference, 0)),
        ArgumentShape::String => {
            if let Some(distance) = hierarchy.distance(STRING_CLASS, class) {
                return Ok(Conversion::new(ConversionRule::StringReference, distance));
            }
            if hierarchy.is_enum(class) {
                return Ok(Conversion::new(ConversionRule::EnumConstant, 0));
            }
            Err(Mismatch::incompatible(shape, declared))
        }
        ArgumentShape::List | ArgumentShape::Set => {
            let own = if *shape == ArgumentShape::List { LIST_CLASS } else { SET_CLASS };
            let extra = match class {
                c if c == own => 0,
                LIST_CLASS | SET_CLASS => 1,
                COLLECTION_CLASS => 1,
                ITERABLE_CLASS => 2,
                OBJECT_CLASS => 3,
                _ => return Err(Mismatch::incompatible(shape, declared)),
            };
            Ok(Conversion::new(ConversionRule::Sequence, extra))
        }
        ArgumentShape::Map => match class {
            MAP_CLASS => Ok(Conversion::new(ConversionRule::Mapping, 0)),
            OBJECT_CLASS => Ok(Conversion::new(ConversionRule::Mapping, 2)),
            _ => Err(Mismatch::incompatible(shape, declared)),
        },
        ArgumentShape::Object(actual) => match hierarchy.distance(actual, class) {
            Some(0) => Ok(Conversion::new(ConversionRule::Identity, 0)),
            Some(distance) => Ok(Conversion::new(ConversionRule::ReferenceWidening, distance - 1)),
            None => boxed_wrapper_widening(shape, class, declared),
        },
        ArgumentShape::Bool
        | ArgumentShape::Int
        | ArgumentShape::Long
        | ArgumentShape::Double
        | ArgumentShape::Char => {
            let Some(source) = shape.primitive() else {
                return Err(Mismatch::incompatible(shape, declared));
            };
            if let Some(target) = PrimitiveType::from_wrapper(class) {
                if target == source {
                    return Ok(Conversion::new(ConversionRule::Boxing, 0));
                }
                let distance = widening_distance(source, target)?;
                return Ok(Conversion::new(ConversionRule::Boxing, distance));
            }
            match hierarchy.accepts_boxed(class, source) {
                Some(distance) => Ok(Conversion::new(ConversionRule::Boxing, distance)),
                None => Err(Mismatch::incompatible(shape, declared)),
            }
        }
    }
}

/// A wrapper object passed where a wider wrapper is declared (`Integer` to `Long`).
fn boxed_wrapper_widening(
    shape: &ArgumentShape,
    class: &str,
    declared: &JavaType,
) -> Result<Conversion, Mismatch> {
    match (shape.primitive(), PrimitiveType::from_wrapper(class)) {
        (Some(source), Some(target)) => {
            let distance = widening_distance(source, target)?;
            Ok(Conversion::new(ConversionRule::Unboxing, distance + 1))
        }
        _ => Err(Mismatch::incompatible(shape, declared)),
    }
}

/// Wildcard-free view of a type argument for element classification.
pub(crate) fn bounded(argument: &JavaType) -> JavaType {
    match argument {
        JavaType::TypeVariable(_) => JavaType::object(),
        other => other.clone(),
    }
}

/// Whether `left` is strictly more specific than `right` for one parameter:
/// primitive beats wrapper, narrower primitive beats wider, subtype beats supertype.
pub fn more_specific_type(left: &JavaType, right: &JavaType, hierarchy: &TypeHierarchy<'_>) -> bool {
    match (left, right) {
        (JavaType::Primitive(left), JavaType::Primitive(right)) => {
            match (left.numeric_rank(), right.numeric_rank()) {
                (Some(left), Some(right)) => left < right,
                _ => false,
            }
        }
        (JavaType::Primitive(primitive), JavaType::Reference { name, .. }) => {
            hierarchy.accepts_boxed(name, *primitive).is_some()
        }
        (JavaType::Reference { name: left, .. }, JavaType::Reference { name: right, .. }) => {
            left != right && hierarchy.is_subtype(left, right) && !hierarchy.is_subtype(right, left)
        }
        (JavaType::Array { .. }, JavaType::Reference { name, .. }) => name == OBJECT_CLASS,
        _ => false,
    }
}
