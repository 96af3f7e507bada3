use crate::error::BridgeError;
use crate::resolver::ResolvedBinding;
use crate::target::CallTarget;
use crate::value::ArgumentShape;
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingKey {
    pub target: CallTarget,
    pub receiver: Option<String>,
    pub shapes: Vec<ArgumentShape>,
}

impl BindingKey {
    pub fn new(target: CallTarget, receiver: Option<String>, shapes: Vec<ArgumentShape>) -> Self {
        Self {
            target,
            receiver,
            shapes,
        }
    }
}

type Slot = Arc<OnceCell<Result<Arc<ResolvedBinding>, BridgeError>>>;

/// Append-only memo of binding resolutions.
///
/// The map lock is held only long enough to fetch the key's cell; the
/// resolution itself runs inside the cell, so concurrent callers of one key
/// wait for a single resolution and share its outcome, failures included.
#[derive(Default)]
pub struct BindingCache {
    slots: Mutex<IndexMap<BindingKey, Slot>>,
}

impl BindingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_resolve<F>(
        &self,
        key: BindingKey,
        resolve: F,
    ) -> Result<Arc<ResolvedBinding>, BridgeError>
    where
        F: FnOnce(&BindingKey) -> Result<ResolvedBinding, BridgeError>,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        slot.get_or_init(|| resolve(&key).map(Arc::new)).clone()
    }

    pub fn get(&self, key: &BindingKey) -> Option<Result<Arc<ResolvedBinding>, BridgeError>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).and_then(|slot| slot.get().cloned())
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Successful resolutions in first-request order.
    pub fn resolved(&self) -> Vec<Arc<ResolvedBinding>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .values()
            .filter_map(|slot| match slot.get() {
                Some(Ok(binding)) => Some(Arc::clone(binding)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::InvokeKind;
    use crate::rules::ConversionCost;
    use jv_classpath::JavaType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn binding(target: &CallTarget) -> ResolvedBinding {
        ResolvedBinding {
            target: target.clone(),
            owner: target.owner().to_string(),
            name: target.member().to_string(),
            descriptor: "()V".to_string(),
            parameters: Vec::new(),
            return_type: JavaType::Void,
            conversions: Vec::new(),
            invoke_kind: InvokeKind::InvokeStatic,
            varargs: false,
            cost: ConversionCost::default(),
        }
    }

    #[test]
    fn concurrent_callers_share_one_resolution() {
        let cache = Arc::new(BindingCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));
        let target = CallTarget::static_method("demo.Util", "run");

        let handles = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                let target = target.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_or_resolve(BindingKey::new(target, None, Vec::new()), |key| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(10));
                        Ok(binding(&key.target))
                    })
                })
            })
            .collect::<Vec<_>>();

        let results = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread").expect("binding"))
            .collect::<Vec<_>>();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failures_are_memoized() {
        let cache = BindingCache::new();
        let target = CallTarget::static_method("demo.Util", "missing");
        let key = BindingKey::new(target.clone(), None, vec![ArgumentShape::Int]);
        let failure = BridgeError::InvalidTarget {
            target: target.to_string(),
            reason: "is not public".into(),
        };

        let first = cache.get_or_resolve(key.clone(), |_| Err(failure.clone()));
        let second = cache.get_or_resolve(key.clone(), |_| unreachable!("memoized"));
        assert_eq!(first, Err(failure.clone()));
        assert_eq!(second, Err(failure));
        assert!(cache.resolved().is_empty());
        assert!(cache.get(&key).is_some());
    }
}
