//! Invocation bridge for interop call targets.
//!
//! A [`CallTarget`] names an owner class and a binding (`owner#name`,
//! `owner#$new`, `owner#$instance$name`, field accessors). The
//! [`BindingResolver`] looks the owner up in the run's [`jv_isolation::ClassView`],
//! walks the inheritance chain for instance bindings, and ranks overloads
//! with the rule table in [`rules`]. Resolutions are memoized per
//! `(target, receiver class, argument shapes)` by [`BindingCache`]; the
//! [`ArgumentAdapter`] converts concrete values per call and an [`Invoker`]
//! supplied by the host executes the binding.

mod adapter;
mod cache;
mod emitter;
mod error;
mod hierarchy;
mod invoker;
mod resolver;
pub mod rules;
mod target;
mod value;

#[cfg(test)]
mod tests;

pub use adapter::{AdaptError, ArgumentAdapter};
pub use cache::{BindingCache, BindingKey};
pub use emitter::{BridgeSource, BridgeSourceEmitter, EmitError, DEFAULT_BRIDGE_PACKAGE};
pub use error::BridgeError;
pub use hierarchy::TypeHierarchy;
pub use invoker::{InvocationBridge, InvocationError, Invoker};
pub use resolver::{BindingResolver, InvokeKind, ParameterConversion, ResolvedBinding};
pub use rules::{ConversionCost, ConversionRule};
pub use target::{BindingKind, CallTarget, TargetParseError};
pub use value::{ArgumentShape, InteropValue, JvmValue};
