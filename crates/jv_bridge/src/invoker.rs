use crate::adapter::ArgumentAdapter;
use crate::cache::{BindingCache, BindingKey};
use crate::error::BridgeError;
use crate::resolver::{BindingResolver, ResolvedBinding};
use crate::target::CallTarget;
use crate::value::{ArgumentShape, InteropValue, JvmValue};
use jv_isolation::ClassView;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct InvocationError {
    pub message: String,
}

impl InvocationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Host runtime seam: executes a resolved binding with adapted arguments.
pub trait Invoker: Send + Sync {
    fn invoke(
        &self,
        binding: &ResolvedBinding,
        receiver: Option<&JvmValue>,
        arguments: Vec<JvmValue>,
    ) -> Result<JvmValue, InvocationError>;
}

/// Resolves, memoizes, adapts and dispatches interop calls for one run.
pub struct InvocationBridge {
    view: Arc<ClassView>,
    cache: BindingCache,
}

impl InvocationBridge {
    pub fn new(view: Arc<ClassView>) -> Self {
        Self {
            view,
            cache: BindingCache::new(),
        }
    }

    pub fn view(&self) -> &ClassView {
        &self.view
    }

    pub fn cache(&self) -> &BindingCache {
        &self.cache
    }

    pub fn resolve(
        &self,
        target: &CallTarget,
        receiver_class: Option<&str>,
        shapes: Vec<ArgumentShape>,
    ) -> Result<Arc<ResolvedBinding>, BridgeError> {
        let receiver = receiver_class
            .filter(|_| target.kind().needs_receiver())
            .map(str::to_string);
        let key = BindingKey::new(target.clone(), receiver, shapes);
        self.cache.get_or_resolve(key, |key| {
            BindingResolver::new(&self.view).resolve(&key.target, key.receiver.as_deref(), &key.shapes)
        })
    }

    pub fn call(
        &self,
        invoker: &dyn Invoker,
        target: &CallTarget,
        receiver: Option<&InteropValue>,
        arguments: &[InteropValue],
    ) -> Result<InteropValue, BridgeError> {
        let receiver_class = self.receiver_class(target, receiver)?;
        let shapes = arguments.iter().map(InteropValue::shape).collect();
        let binding = self.resolve(target, receiver_class, shapes)?;

        let adapter = ArgumentAdapter::new(&self.view);
        let adapted = adapter
            .adapt_arguments(&binding, arguments)
            .map_err(|source| BridgeError::Conversion {
                target: target.to_string(),
                source,
            })?;
        let receiver = receiver
            .filter(|_| target.kind().needs_receiver())
            .map(|value| adapter.receiver(value));

        invoker
            .invoke(&binding, receiver.as_ref(), adapted)
            .map(JvmValue::into_interop)
            .map_err(|error| {
                tracing::warn!(call_target = %target, error = %error, "interop invocation failed");
                BridgeError::Invocation {
                    target: target.to_string(),
                    message: error.message,
                }
            })
    }

    fn receiver_class<'v>(
        &self,
        target: &CallTarget,
        receiver: Option<&'v InteropValue>,
    ) -> Result<Option<&'v str>, BridgeError> {
        if !target.kind().needs_receiver() {
            return Ok(None);
        }
        match receiver {
            Some(InteropValue::Object { class, .. }) => Ok(Some(class.as_str())),
            Some(other) => Err(BridgeError::InvalidTarget {
                target: target.to_string(),
                reason: format!("receiver must be an object reference, got {}", other.describe()),
            }),
            None => Err(BridgeError::InvalidTarget {
                target: target.to_string(),
                reason: "instance binding requires a receiver".to_string(),
            }),
        }
    }
}
