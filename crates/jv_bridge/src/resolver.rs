use crate::error::BridgeError;
use crate::hierarchy::TypeHierarchy;
use crate::rules::{
    classify, more_specific_type, Conversion, ConversionCost, ConversionRule, Mismatch,
};
use crate::target::{BindingKind, CallTarget};
use crate::value::{describe_shapes, ArgumentShape};
use jv_classpath::{ClassStub, JavaType, MemberKind, MemberSignature, SymbolRecord};
use jv_isolation::ClassView;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// JVM instruction family a binding compiles to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvokeKind {
    InvokeStatic,
    InvokeSpecial,
    InvokeVirtual,
    InvokeInterface,
    GetStatic,
    PutStatic,
    GetField,
    PutField,
}

impl InvokeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InvokeKind::InvokeStatic => "invokestatic",
            InvokeKind::InvokeSpecial => "invokespecial",
            InvokeKind::InvokeVirtual => "invokevirtual",
            InvokeKind::InvokeInterface => "invokeinterface",
            InvokeKind::GetStatic => "getstatic",
            InvokeKind::PutStatic => "putstatic",
            InvokeKind::GetField => "getfield",
            InvokeKind::PutField => "putfield",
        }
    }
}

impl fmt::Display for InvokeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterConversion {
    pub index: usize,
    pub parameter: JavaType,
    pub shape: ArgumentShape,
    pub rule: ConversionRule,
    pub cost: ConversionCost,
}

/// Outcome of resolving one binding key. Immutable once cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedBinding {
    pub target: CallTarget,
    /// Declaring class of the selected member.
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    /// Declared parameter types, generic where a signature is known.
    pub parameters: Vec<JavaType>,
    pub return_type: JavaType,
    pub conversions: Vec<ParameterConversion>,
    pub invoke_kind: InvokeKind,
    /// The trailing arguments are collected into the varargs array.
    pub varargs: bool,
    pub cost: ConversionCost,
}

impl ResolvedBinding {
    /// `owner#name descriptor`, used in logs and reports.
    pub fn signature(&self) -> String {
        format!("{}#{}{}", self.owner, self.name, self.descriptor)
    }
}

struct Candidate<'a> {
    declaring: &'a ClassStub,
    member: &'a MemberSignature,
}

impl Candidate<'_> {
    fn signature(&self) -> String {
        format!("{}#{}{}", self.declaring.name, self.member.name, self.member.descriptor)
    }

    /// Declared parameter type used for classification. Bare type variables
    /// fall back to their erasure so bounds are kept.
    fn parameter(&self, index: usize) -> JavaType {
        let generic = self.member.generic_parameters();
        match generic.get(index) {
            Some(JavaType::TypeVariable(_)) | None => self.member.parameters[index].clone(),
            Some(declared) => declared.clone(),
        }
    }

    fn parameters(&self) -> Vec<JavaType> {
        (0..self.member.parameters.len())
            .map(|index| self.parameter(index))
            .collect()
    }

    fn arity_matches(&self, count: usize) -> bool {
        let declared = self.member.parameters.len();
        declared == count || self.member.is_varargs() && count + 1 >= declared
    }
}

struct Applied<'a> {
    candidate: &'a Candidate<'a>,
    conversions: Vec<ParameterConversion>,
    cost: ConversionCost,
    spread: bool,
}

impl Applied<'_> {
    /// Parameter list expanded to the argument count for specificity checks.
    fn expanded_parameters(&self, count: usize) -> Vec<JavaType> {
        let mut parameters = self.candidate.parameters();
        if !self.spread {
            return parameters;
        }
        let component = match parameters.pop() {
            Some(JavaType::Array {
                element,
                dimensions,
            }) if dimensions > 1 => JavaType::Array {
                element,
                dimensions: dimensions - 1,
            },
            Some(JavaType::Array { element, .. }) => *element,
            _ => JavaType::object(),
        };
        while parameters.len() < count {
            parameters.push(component.clone());
        }
        parameters
    }

    fn order(&self, other: &Self) -> Ordering {
        self.cost
            .cmp(&other.cost)
            .then(self.spread.cmp(&other.spread))
            .then_with(|| {
                self.candidate
                    .member
                    .descriptor
                    .cmp(&other.candidate.member.descriptor)
            })
            .then_with(|| self.candidate.declaring.name.cmp(&other.candidate.declaring.name))
    }
}

/// Failure of one candidate against the argument shapes.
struct Rejection {
    signature: String,
    mismatches: Vec<(usize, Mismatch)>,
}

impl Rejection {
    fn only_narrowing(&self) -> bool {
        !self.mismatches.is_empty()
            && self
                .mismatches
                .iter()
                .all(|(_, mismatch)| mismatch.is_narrowing())
    }

    fn describe(&self) -> String {
        let reasons = self
            .mismatches
            .iter()
            .map(|(index, mismatch)| format!("argument {index}: {mismatch}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}: {}", self.signature, reasons)
    }
}

/// Resolves call targets against the selected class view.
pub struct BindingResolver<'a> {
    view: &'a ClassView,
    hierarchy: TypeHierarchy<'a>,
}

impl<'a> BindingResolver<'a> {
    pub fn new(view: &'a ClassView) -> Self {
        Self {
            view,
            hierarchy: TypeHierarchy::new(view),
        }
    }

    pub fn resolve(
        &self,
        target: &CallTarget,
        receiver_class: Option<&str>,
        shapes: &[ArgumentShape],
    ) -> Result<ResolvedBinding, BridgeError> {
        let owner = self.lookup_class(target, target.owner())?;
        let start = self.lookup_start(target, owner, receiver_class)?;

        let resolved = match target.kind() {
            kind if kind.is_field() => self.resolve_field(target, start, shapes),
            BindingKind::Constructor => self.resolve_constructor(target, owner, shapes),
            _ => self.resolve_method(target, start, shapes),
        };
        match &resolved {
            Ok(binding) => tracing::debug!(
                call_target = %target,
                selected = %binding.signature(),
                rule_cost = binding.cost.cost,
                "interop binding resolved"
            ),
            Err(error) => tracing::warn!(
                call_target = %target,
                code = error.code(),
                error = %error,
                "interop binding failed"
            ),
        }
        resolved
    }

    fn lookup_class(&self, target: &CallTarget, class: &str) -> Result<&'a SymbolRecord, BridgeError> {
        if let Some(record) = self.view.lookup(class) {
            return Ok(record);
        }
        if let Some(reason) = self.view.explain_missing(class) {
            return Err(BridgeError::Unavailable {
                target: target.to_string(),
                reason: reason.clone(),
            });
        }
        Err(BridgeError::ClassNotFound {
            target: target.to_string(),
            class: class.to_string(),
        })
    }

    /// Instance bindings start the member walk at the receiver's concrete class.
    fn lookup_start(
        &self,
        target: &CallTarget,
        owner: &'a SymbolRecord,
        receiver_class: Option<&str>,
    ) -> Result<&'a SymbolRecord, BridgeError> {
        let Some(receiver) = receiver_class.filter(|_| target.kind().needs_receiver()) else {
            return Ok(owner);
        };
        if receiver == owner.qualified_name {
            return Ok(owner);
        }
        let Some(concrete) = self.view.lookup(receiver) else {
            tracing::debug!(call_target = %target, receiver, "receiver class not indexed; using owner members");
            return Ok(owner);
        };
        if !self.hierarchy.is_subtype(receiver, &owner.qualified_name) {
            return Err(BridgeError::InvalidTarget {
                target: target.to_string(),
                reason: format!(
                    "receiver of type `{receiver}` is not an instance of `{}`",
                    owner.qualified_name
                ),
            });
        }
        Ok(concrete)
    }

    fn resolve_constructor(
        &self,
        target: &CallTarget,
        owner: &'a SymbolRecord,
        shapes: &[ArgumentShape],
    ) -> Result<ResolvedBinding, BridgeError> {
        let class = &owner.class;
        if class.is_interface() || class.access & jv_classpath::ACC_ABSTRACT != 0 {
            return Err(BridgeError::InvalidTarget {
                target: target.to_string(),
                reason: format!("`{}` is abstract and cannot be instantiated", class.name),
            });
        }
        let named = class
            .constructors()
            .map(|member| Candidate {
                declaring: class,
                member,
            })
            .collect::<Vec<_>>();
        if named.is_empty() {
            return Err(BridgeError::MemberNotFound {
                target: target.to_string(),
                class: class.name.clone(),
                member: "<init>".to_string(),
            });
        }
        self.select(target, named, shapes)
    }

    fn resolve_method(
        &self,
        target: &CallTarget,
        start: &'a SymbolRecord,
        shapes: &[ArgumentShape],
    ) -> Result<ResolvedBinding, BridgeError> {
        let named = self.collect_methods(&start.qualified_name, target.member());
        if named.is_empty() {
            return Err(BridgeError::MemberNotFound {
                target: target.to_string(),
                class: start.qualified_name.clone(),
                member: target.member().to_string(),
            });
        }
        self.select(target, named, shapes)
    }

    /// Methods named `name` visible from `class`. A subclass member hides
    /// inherited members with the same erased descriptor. Bridge and
    /// synthetic methods are dropped when a regular method remains.
    fn collect_methods(&self, class: &str, name: &str) -> Vec<Candidate<'a>> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for ancestor in self.hierarchy.member_lookup_order(class) {
            let Some(record) = self.view.lookup(&ancestor) else {
                continue;
            };
            for member in record.class.members_named(name) {
                if member.kind != MemberKind::Method {
                    continue;
                }
                if seen.insert(member.erased_key()) {
                    candidates.push(Candidate {
                        declaring: &record.class,
                        member,
                    });
                }
            }
        }
        if candidates
            .iter()
            .any(|candidate| !candidate.member.is_bridge_or_synthetic())
        {
            candidates.retain(|candidate| !candidate.member.is_bridge_or_synthetic());
        }
        candidates
    }

    /// Arity filter, defect checks, then ranking.
    fn select(
        &self,
        target: &CallTarget,
        named: Vec<Candidate<'a>>,
        shapes: &[ArgumentShape],
    ) -> Result<ResolvedBinding, BridgeError> {
        let arguments = describe_shapes(shapes);
        let (by_arity, wrong_arity): (Vec<_>, Vec<_>) = named
            .into_iter()
            .partition(|candidate| candidate.arity_matches(shapes.len()));
        if by_arity.is_empty() {
            let mut failures = wrong_arity
                .iter()
                .map(|candidate| {
                    format!(
                        "{}: expects {} argument(s), got {}",
                        candidate.signature(),
                        candidate.member.parameters.len(),
                        shapes.len()
                    )
                })
                .collect::<Vec<_>>();
            failures.sort();
            return Err(BridgeError::NoApplicableOverload {
                target: target.to_string(),
                arguments,
                failures,
            });
        }

        let (valid, defective): (Vec<_>, Vec<_>) = by_arity
            .into_iter()
            .partition(|candidate| member_defect(target.kind(), candidate.member).is_none());
        if valid.is_empty() {
            let mut reasons = defective
                .iter()
                .filter_map(|candidate| {
                    member_defect(target.kind(), candidate.member)
                        .map(|defect| format!("`{}` {defect}", candidate.signature()))
                })
                .collect::<Vec<_>>();
            reasons.sort();
            return Err(BridgeError::InvalidTarget {
                target: target.to_string(),
                reason: reasons.join("; "),
            });
        }
        for candidate in &defective {
            tracing::debug!(
                call_target = %target,
                candidate = %candidate.signature(),
                "skipping candidate that does not fit the binding kind"
            );
        }

        let mut applied = Vec::new();
        let mut rejected = Vec::new();
        for candidate in &valid {
            match self.apply(candidate, shapes) {
                Ok(application) => applied.push(application),
                Err(rejection) => rejected.push(rejection),
            }
        }

        if applied.is_empty() {
            rejected.sort_by(|left, right| left.signature.cmp(&right.signature));
            if rejected.iter().all(Rejection::only_narrowing) {
                let (from, to) = rejected
                    .first()
                    .and_then(|rejection| rejection.mismatches.first())
                    .map(|(_, mismatch)| match mismatch {
                        Mismatch::Narrowing { from, to } => (from.clone(), to.clone()),
                        Mismatch::Incompatible { .. } => (String::new(), String::new()),
                    })
                    .unwrap_or_default();
                return Err(BridgeError::NumericConversion {
                    target: target.to_string(),
                    from,
                    to,
                    candidates: rejected.iter().map(Rejection::describe).collect(),
                });
            }
            return Err(BridgeError::NoApplicableOverload {
                target: target.to_string(),
                arguments,
                failures: rejected.iter().map(Rejection::describe).collect(),
            });
        }

        applied.sort_by(|left, right| left.order(right));
        let best_cost = applied[0].cost;
        let best_spread = applied[0].spread;
        let tied = applied
            .iter()
            .filter(|application| application.cost == best_cost && application.spread == best_spread)
            .collect::<Vec<_>>();
        let winner = match tied.as_slice() {
            [only] => *only,
            _ => match self.specificity_winner(&tied, shapes.len()) {
                Some(winner) => winner,
                None => {
                    return Err(BridgeError::AmbiguousOverload {
                        target: target.to_string(),
                        arguments,
                        candidates: tied
                            .iter()
                            .map(|application| {
                                format!(
                                    "{} (phase {}, cost {})",
                                    application.candidate.signature(),
                                    application.cost.phase,
                                    application.cost.cost
                                )
                            })
                            .collect(),
                    })
                }
            },
        };
        Ok(self.binding(target, winner))
    }

    fn apply<'c>(&self, candidate: &'c Candidate<'c>, shapes: &[ArgumentShape]) -> Result<Applied<'c>, Rejection> {
        let declared = candidate.member.parameters.len();
        let mut fixed_rejection = None;
        if declared == shapes.len() {
            match self.convert_all(candidate, shapes, declared) {
                Ok(conversions) => {
                    return Ok(Applied {
                        candidate,
                        cost: total_cost(&conversions),
                        conversions,
                        spread: false,
                    })
                }
                Err(mismatches) => fixed_rejection = Some(mismatches),
            }
        }

        if candidate.member.is_varargs() && shapes.len() + 1 >= declared {
            match self.convert_spread(candidate, shapes) {
                Ok(conversions) => {
                    return Ok(Applied {
                        candidate,
                        cost: total_cost(&conversions),
                        conversions,
                        spread: true,
                    })
                }
                Err(mismatches) => {
                    fixed_rejection.get_or_insert(mismatches);
                }
            }
        }

        Err(Rejection {
            signature: candidate.signature(),
            mismatches: fixed_rejection.unwrap_or_default(),
        })
    }

    fn convert_all(
        &self,
        candidate: &Candidate<'_>,
        shapes: &[ArgumentShape],
        count: usize,
    ) -> Result<Vec<ParameterConversion>, Vec<(usize, Mismatch)>> {
        let mut conversions = Vec::with_capacity(count);
        let mut mismatches = Vec::new();
        for (index, shape) in shapes.iter().take(count).enumerate() {
            let parameter = candidate.parameter(index);
            match classify(shape, &parameter, &self.hierarchy) {
                Ok(conversion) => conversions.push(parameter_conversion(index, parameter, shape, conversion)),
                Err(mismatch) => mismatches.push((index, mismatch)),
            }
        }
        if mismatches.is_empty() {
            Ok(conversions)
        } else {
            Err(mismatches)
        }
    }

    fn convert_spread(
        &self,
        candidate: &Candidate<'_>,
        shapes: &[ArgumentShape],
    ) -> Result<Vec<ParameterConversion>, Vec<(usize, Mismatch)>> {
        let fixed = candidate.member.parameters.len() - 1;
        let (mut conversions, mut mismatches) = match self.convert_all(candidate, shapes, fixed) {
            Ok(conversions) => (conversions, Vec::new()),
            Err(mismatches) => (Vec::new(), mismatches),
        };
        let component = match candidate.parameter(fixed) {
            JavaType::Array {
                element,
                dimensions,
            } if dimensions > 1 => JavaType::Array {
                element,
                dimensions: dimensions - 1,
            },
            JavaType::Array { element, .. } => *element,
            _ => JavaType::object(),
        };
        for (index, shape) in shapes.iter().enumerate().skip(fixed) {
            match classify(shape, &component, &self.hierarchy) {
                Ok(conversion) => {
                    conversions.push(parameter_conversion(index, component.clone(), shape, conversion))
                }
                Err(mismatch) => mismatches.push((index, mismatch)),
            }
        }
        if !mismatches.is_empty() {
            return Err(mismatches);
        }
        conversions.push(ParameterConversion {
            index: fixed,
            parameter: candidate.parameter(fixed),
            shape: ArgumentShape::List,
            rule: ConversionRule::Varargs,
            cost: ConversionCost {
                phase: ConversionRule::Varargs.phase(),
                cost: ConversionRule::Varargs.base_cost(),
            },
        });
        Ok(conversions)
    }

    /// The single candidate at least as specific as every other in every
    /// parameter and strictly more specific in one.
    fn specificity_winner<'c>(&self, tied: &[&'c Applied<'c>], count: usize) -> Option<&'c Applied<'c>> {
        let expanded = tied
            .iter()
            .map(|application| application.expanded_parameters(count))
            .collect::<Vec<_>>();
        let mut winner = None;
        for (index, parameters) in expanded.iter().enumerate() {
            let dominates = expanded
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != index)
                .all(|(_, other)| self.more_specific(parameters, other));
            if dominates {
                if winner.is_some() {
                    return None;
                }
                winner = Some(tied[index]);
            }
        }
        winner
    }

    fn more_specific(&self, left: &[JavaType], right: &[JavaType]) -> bool {
        if left.len() != right.len() {
            return false;
        }
        let mut strict = false;
        for (left, right) in left.iter().zip(right) {
            if left.erasure() == right.erasure() {
                continue;
            }
            if more_specific_type(left, right, &self.hierarchy) {
                strict = true;
                continue;
            }
            return false;
        }
        strict
    }

    fn binding(&self, target: &CallTarget, applied: &Applied<'_>) -> ResolvedBinding {
        let candidate = applied.candidate;
        let invoke_kind = match target.kind() {
            BindingKind::Static => InvokeKind::InvokeStatic,
            BindingKind::Constructor => InvokeKind::InvokeSpecial,
            _ if candidate.declaring.is_interface() => InvokeKind::InvokeInterface,
            _ => InvokeKind::InvokeVirtual,
        };
        let return_type = match target.kind() {
            BindingKind::Constructor => JavaType::reference(candidate.declaring.name.clone()),
            _ => candidate
                .member
                .generic
                .as_ref()
                .map(|generic| generic.return_type.clone())
                .unwrap_or_else(|| candidate.member.return_type.clone()),
        };
        ResolvedBinding {
            target: target.clone(),
            owner: candidate.declaring.name.clone(),
            name: candidate.member.name.clone(),
            descriptor: candidate.member.descriptor.clone(),
            parameters: candidate.parameters(),
            return_type,
            conversions: applied.conversions.clone(),
            invoke_kind,
            varargs: applied.spread,
            cost: applied.cost,
        }
    }

    fn resolve_field(
        &self,
        target: &CallTarget,
        start: &'a SymbolRecord,
        shapes: &[ArgumentShape],
    ) -> Result<ResolvedBinding, BridgeError> {
        let found = self
            .hierarchy
            .member_lookup_order(&start.qualified_name)
            .into_iter()
            .filter_map(|class| self.view.lookup(&class))
            .find_map(|record| {
                record
                    .class
                    .members_named(target.member())
                    .find(|member| member.kind == MemberKind::Field)
                    .map(|member| (&record.class, member))
            });
        let Some((declaring, field)) = found else {
            return Err(BridgeError::MemberNotFound {
                target: target.to_string(),
                class: start.qualified_name.clone(),
                member: target.member().to_string(),
            });
        };

        let signature = format!("{}#{}:{}", declaring.name, field.name, field.descriptor);
        let writes = matches!(target.kind(), BindingKind::StaticSet | BindingKind::InstanceSet);
        let defect = member_defect(target.kind(), field)
            .or_else(|| (writes && field.is_final()).then_some("is final"));
        if let Some(defect) = defect {
            return Err(BridgeError::InvalidTarget {
                target: target.to_string(),
                reason: format!("`{signature}` {defect}"),
            });
        }

        let expected = target.kind().field_arity().unwrap_or_default();
        if shapes.len() != expected {
            return Err(BridgeError::NoApplicableOverload {
                target: target.to_string(),
                arguments: describe_shapes(shapes),
                failures: vec![format!(
                    "{signature}: expects {expected} argument(s), got {}",
                    shapes.len()
                )],
            });
        }

        let field_type = match field.generic_field_type() {
            JavaType::TypeVariable(_) => field.return_type.clone(),
            declared => declared.clone(),
        };
        let mut conversions = Vec::new();
        if let Some(shape) = shapes.first() {
            match classify(shape, &field_type, &self.hierarchy) {
                Ok(conversion) => {
                    conversions.push(parameter_conversion(0, field_type.clone(), shape, conversion))
                }
                Err(Mismatch::Narrowing { from, to }) => {
                    return Err(BridgeError::NumericConversion {
                        target: target.to_string(),
                        from,
                        to,
                        candidates: vec![signature],
                    })
                }
                Err(mismatch) => {
                    return Err(BridgeError::NoApplicableOverload {
                        target: target.to_string(),
                        arguments: describe_shapes(shapes),
                        failures: vec![format!("{signature}: argument 0: {mismatch}")],
                    })
                }
            }
        }

        let invoke_kind = match target.kind() {
            BindingKind::StaticGet => InvokeKind::GetStatic,
            BindingKind::StaticSet => InvokeKind::PutStatic,
            BindingKind::InstanceGet => InvokeKind::GetField,
            _ => InvokeKind::PutField,
        };
        let (parameters, return_type) = if writes {
            (vec![field_type], JavaType::Void)
        } else {
            (Vec::new(), field_type)
        };
        Ok(ResolvedBinding {
            target: target.clone(),
            owner: declaring.name.clone(),
            name: field.name.clone(),
            descriptor: field.descriptor.clone(),
            parameters,
            return_type,
            cost: total_cost(&conversions),
            conversions,
            invoke_kind,
            varargs: false,
        })
    }
}

/// Why a member cannot serve a binding of `kind`, if it cannot.
fn member_defect(kind: BindingKind, member: &MemberSignature) -> Option<&'static str> {
    if !member.is_public() {
        return Some("is not public");
    }
    match kind {
        BindingKind::Constructor => None,
        kind if kind.is_static() && !member.is_static() => Some("is not static"),
        kind if !kind.is_static() && member.is_static() => Some("is static"),
        _ => None,
    }
}

fn parameter_conversion(
    index: usize,
    parameter: JavaType,
    shape: &ArgumentShape,
    conversion: Conversion,
) -> ParameterConversion {
    ParameterConversion {
        index,
        parameter,
        shape: shape.clone(),
        rule: conversion.rule,
        cost: conversion.cost,
    }
}

fn total_cost(conversions: &[ParameterConversion]) -> ConversionCost {
    conversions
        .iter()
        .fold(ConversionCost::default(), |total, conversion| total.combine(conversion.cost))
}
