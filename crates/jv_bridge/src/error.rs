use crate::adapter::AdaptError;
use crate::target::TargetParseError;
use jv_diagnostics::{codes, descriptor, InteropDiagnostic, IntoDiagnostic};
use jv_isolation::Unavailable;
use thiserror::Error;

/// Resolution and invocation failures. Cloneable so a memoized failure can
/// be handed to every caller of the same binding key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error(transparent)]
    Parse(#[from] TargetParseError),
    #[error("invalid interop target `{target}`: {reason}")]
    InvalidTarget { target: String, reason: String },
    #[error("interop target `{target}`: class `{class}` was not found on the mediated classpath")]
    ClassNotFound { target: String, class: String },
    #[error("interop target `{target}`: class `{class}` has no member `{member}`")]
    MemberNotFound {
        target: String,
        class: String,
        member: String,
    },
    #[error("interop target `{target}`: {detail}", detail = .reason.to_diagnostic().message)]
    Unavailable { target: String, reason: Unavailable },
    #[error("interop target `{target}`: numeric conversion from {from} to {to} requires narrowing")]
    NumericConversion {
        target: String,
        from: String,
        to: String,
        candidates: Vec<String>,
    },
    #[error("interop target `{target}`: ambiguous overload for argument types {arguments}: {}", .candidates.join("; "))]
    AmbiguousOverload {
        target: String,
        arguments: String,
        candidates: Vec<String>,
    },
    #[error("interop target `{target}`: no applicable overload for argument types {arguments}: {}", .failures.join("; "))]
    NoApplicableOverload {
        target: String,
        arguments: String,
        failures: Vec<String>,
    },
    #[error("interop target `{target}` argument conversion failed: {source}")]
    Conversion {
        target: String,
        #[source]
        source: AdaptError,
    },
    #[error("interop target `{target}` failed during invocation: {message}")]
    Invocation { target: String, message: String },
}

impl BridgeError {
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Parse(_) | BridgeError::InvalidTarget { .. } => codes::INVALID_TARGET,
            BridgeError::ClassNotFound { .. } | BridgeError::MemberNotFound { .. } => {
                codes::SYMBOL_NOT_FOUND
            }
            BridgeError::Unavailable { reason, .. } => match reason {
                Unavailable::ScopeExcluded(_) => codes::SCOPE_VIOLATION,
                Unavailable::Skipped(_) => codes::UNREADABLE_SYMBOL,
                Unavailable::ReleaseMismatch(_) => codes::RELEASE_MISMATCH,
            },
            BridgeError::NumericConversion { .. } => codes::NUMERIC_CONVERSION,
            BridgeError::AmbiguousOverload { .. } => codes::AMBIGUOUS_OVERLOAD,
            BridgeError::NoApplicableOverload { .. } => codes::NO_APPLICABLE_OVERLOAD,
            BridgeError::Conversion { source, .. } if source.is_numeric() => {
                codes::NUMERIC_CONVERSION
            }
            BridgeError::Conversion { .. } => codes::GENERIC_CONVERSION,
            BridgeError::Invocation { .. } => codes::INVOCATION_FAILED,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            BridgeError::Parse(error) => error.target(),
            BridgeError::InvalidTarget { target, .. }
            | BridgeError::ClassNotFound { target, .. }
            | BridgeError::MemberNotFound { target, .. }
            | BridgeError::Unavailable { target, .. }
            | BridgeError::NumericConversion { target, .. }
            | BridgeError::AmbiguousOverload { target, .. }
            | BridgeError::NoApplicableOverload { target, .. }
            | BridgeError::Conversion { target, .. }
            | BridgeError::Invocation { target, .. } => target,
        }
    }
}

impl IntoDiagnostic for BridgeError {
    fn to_diagnostic(&self) -> InteropDiagnostic {
        if let BridgeError::Unavailable { target, reason } = self {
            return reason.to_diagnostic().with_context("target", target);
        }

        let mut diagnostic =
            InteropDiagnostic::error(self.code(), self.to_string()).with_context("target", self.target());
        match self {
            BridgeError::ClassNotFound { class, .. } => {
                diagnostic = diagnostic.with_context("class", class);
            }
            BridgeError::MemberNotFound { class, member, .. } => {
                diagnostic = diagnostic
                    .with_context("class", class)
                    .with_context("member", member);
            }
            BridgeError::NumericConversion {
                from,
                to,
                candidates,
                ..
            } => {
                diagnostic = diagnostic
                    .with_context("from", from)
                    .with_context("to", to)
                    .with_context("candidates", candidates.join("; "));
            }
            BridgeError::AmbiguousOverload {
                arguments,
                candidates,
                ..
            } => {
                diagnostic = diagnostic
                    .with_context("argumentTypes", arguments)
                    .with_context("candidates", candidates.join("; "));
            }
            BridgeError::NoApplicableOverload {
                arguments,
                failures,
                ..
            } => {
                diagnostic = diagnostic
                    .with_context("argumentTypes", arguments)
                    .with_context("failures", failures.join("; "));
            }
            BridgeError::Conversion { source, .. } => {
                diagnostic = match source {
                    AdaptError::EnumConstant { expected, value, .. } => diagnostic
                        .with_context("expectedEnum", expected)
                        .with_context("value", value),
                    AdaptError::Narrowing { path, from, to } => diagnostic
                        .with_context("argument", path)
                        .with_context("from", from)
                        .with_context("to", to),
                    AdaptError::OutOfRange { path, value, to } => diagnostic
                        .with_context("argument", path)
                        .with_context("value", value)
                        .with_context("to", to),
                    AdaptError::Incompatible {
                        path,
                        expected,
                        value,
                    } => diagnostic
                        .with_context("argument", path)
                        .with_context("expected", expected)
                        .with_context("value", value),
                };
            }
            _ => {}
        }
        match descriptor(self.code()) {
            Some(entry) => diagnostic.with_remedy(entry.help),
            None => diagnostic,
        }
    }
}
