use super::circularity::CircularityLock;
use super::host::{ClassLoaderHandle, HostError};
use crate::jvm::BinaryName;
use crate::transform::BuildError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Everything a transformer gets to see about one class
pub struct TransformContext<'a> {
    pub name: &'a BinaryName,
    pub loader: &'a Arc<ClassLoaderHandle>,

    /// Whether the class was already loaded when the agent found it
    pub already_loaded: bool,

    /// Class file bytes as the host currently has them
    pub bytes: &'a [u8],
}

/// User-facing transformation callback
///
/// `Ok(None)` declines the class and leaves its bytes alone.
pub trait Transformer: Send + Sync {
    fn transform(&self, context: &TransformContext<'_>) -> Result<Option<Vec<u8>>, BuildError>;
}

/// Host-facing hook signature
///
/// Hosts know nothing of build errors; a hook either supplies replacement bytes or it
/// does not.
pub trait ClassFileTransformer: Send + Sync {
    fn transform(&self, context: &TransformContext<'_>) -> Option<Vec<u8>>;
}

/// Cheap first-stage filter over raw class coordinates
pub trait RawMatcher: Send + Sync {
    fn matches(
        &self,
        name: &BinaryName,
        loader: &Arc<ClassLoaderHandle>,
        already_loaded: bool,
    ) -> bool;
}

impl<F> RawMatcher for F
where
    F: Fn(&BinaryName, &Arc<ClassLoaderHandle>, bool) -> bool + Send + Sync,
{
    fn matches(
        &self,
        name: &BinaryName,
        loader: &Arc<ClassLoaderHandle>,
        already_loaded: bool,
    ) -> bool {
        self(name, loader, already_loaded)
    }
}

/// Observation points across an agent's life
///
/// Every hook has an empty default, so a listener implements only what it cares about.
pub trait AgentListener: Send + Sync {
    fn on_discovery(&self, _name: &BinaryName) {}
    fn on_transformed(&self, _name: &BinaryName) {}
    fn on_failure(&self, _name: &BinaryName, _message: &str) {}
    fn on_batch_applied(&self, _index: usize, _classes: usize) {}
    fn on_batch_failed(&self, _index: usize, _classes: usize, _error: &HostError) {}
    fn on_reset_class(&self, _name: &BinaryName, _outcome: &Result<(), HostError>) {}
}

/// Listener that forwards everything to the `log` facade
pub struct LogListener;

impl AgentListener for LogListener {
    fn on_discovery(&self, name: &BinaryName) {
        log::trace!("Discovered {:?}", name);
    }

    fn on_transformed(&self, name: &BinaryName) {
        log::debug!("Transformed {:?}", name);
    }

    fn on_failure(&self, name: &BinaryName, message: &str) {
        log::error!("Failed to transform {:?}: {}", name, message);
    }

    fn on_batch_applied(&self, index: usize, classes: usize) {
        log::debug!("Applied batch {} covering {} classes", index, classes);
    }

    fn on_batch_failed(&self, index: usize, classes: usize, error: &HostError) {
        log::error!("Batch {} covering {} classes failed: {}", index, classes, error);
    }

    fn on_reset_class(&self, name: &BinaryName, outcome: &Result<(), HostError>) {
        match outcome {
            Ok(()) => log::debug!("Reset {:?}", name),
            Err(error) => log::error!("Failed to reset {:?}: {}", name, error),
        }
    }
}

pub(super) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return String::from(*message);
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    String::from("panic during transformation")
}

/// Host hook that polices a user transformer
///
/// The guard enforces three things at the host boundary: reentrant transformation is
/// skipped via the circularity lock, unmatched classes pass through untouched, and no
/// error or panic from user code ever reaches the host.
pub struct GuardedTransformer {
    lock: Arc<CircularityLock>,
    matcher: Arc<dyn RawMatcher>,
    inner: Arc<dyn Transformer>,
    listener: Arc<dyn AgentListener>,
}

impl GuardedTransformer {
    pub fn new(
        lock: Arc<CircularityLock>,
        matcher: Arc<dyn RawMatcher>,
        inner: Arc<dyn Transformer>,
        listener: Arc<dyn AgentListener>,
    ) -> GuardedTransformer {
        GuardedTransformer {
            lock,
            matcher,
            inner,
            listener,
        }
    }

    fn guarded(&self, context: &TransformContext<'_>) -> Option<Vec<u8>> {
        if !self
            .matcher
            .matches(context.name, context.loader, context.already_loaded)
        {
            return None;
        }
        match self.inner.transform(context) {
            Ok(Some(bytes)) => {
                self.listener.on_transformed(context.name);
                Some(bytes)
            }
            Ok(None) => None,
            Err(error) => {
                self.listener.on_failure(context.name, &error.to_string());
                None
            }
        }
    }
}

impl ClassFileTransformer for GuardedTransformer {
    fn transform(&self, context: &TransformContext<'_>) -> Option<Vec<u8>> {
        if !self.lock.acquire() {
            return None;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.guarded(context)));
        self.lock.release();
        match outcome {
            Ok(result) => result,
            Err(payload) => {
                self.listener
                    .on_failure(context.name, &panic_message(payload));
                None
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::Name;
    use parking_lot::Mutex;

    struct Recording {
        transformed: Mutex<Vec<String>>,
        failures: Mutex<Vec<String>>,
    }

    impl Recording {
        fn new() -> Recording {
            Recording {
                transformed: Mutex::new(vec![]),
                failures: Mutex::new(vec![]),
            }
        }
    }

    impl AgentListener for Recording {
        fn on_transformed(&self, name: &BinaryName) {
            self.transformed.lock().push(String::from(name.as_str()));
        }

        fn on_failure(&self, name: &BinaryName, message: &str) {
            self.failures.lock().push(format!("{}: {}", name.as_str(), message));
        }
    }

    struct Reverse;

    impl Transformer for Reverse {
        fn transform(
            &self,
            context: &TransformContext<'_>,
        ) -> Result<Option<Vec<u8>>, BuildError> {
            let mut bytes = context.bytes.to_vec();
            bytes.reverse();
            Ok(Some(bytes))
        }
    }

    struct Panicking;

    impl Transformer for Panicking {
        fn transform(
            &self,
            _context: &TransformContext<'_>,
        ) -> Result<Option<Vec<u8>>, BuildError> {
            panic!("boom");
        }
    }

    fn binary(name: &str) -> BinaryName {
        BinaryName::from_string(String::from(name)).unwrap()
    }

    fn match_everything() -> Arc<dyn RawMatcher> {
        Arc::new(|_: &BinaryName, _: &Arc<ClassLoaderHandle>, _: bool| true)
    }

    #[test]
    fn held_lock_skips_transformation() {
        let lock = Arc::new(CircularityLock::new());
        let listener = Arc::new(Recording::new());
        let guard = GuardedTransformer::new(
            lock.clone(),
            match_everything(),
            Arc::new(Reverse),
            listener.clone(),
        );

        let name = binary("me/Foo");
        let loader = ClassLoaderHandle::bootstrap();
        let context = TransformContext {
            name: &name,
            loader: &loader,
            already_loaded: false,
            bytes: &[1, 2, 3],
        };

        assert!(lock.acquire());
        assert_eq!(guard.transform(&context), None);
        lock.release();

        assert_eq!(guard.transform(&context), Some(vec![3, 2, 1]));
        assert_eq!(listener.transformed.lock().len(), 1);
    }

    #[test]
    fn panics_are_contained_and_the_lock_is_released() {
        let lock = Arc::new(CircularityLock::new());
        let listener = Arc::new(Recording::new());
        let guard = GuardedTransformer::new(
            lock.clone(),
            match_everything(),
            Arc::new(Panicking),
            listener.clone(),
        );

        let name = binary("me/Foo");
        let loader = ClassLoaderHandle::bootstrap();
        let context = TransformContext {
            name: &name,
            loader: &loader,
            already_loaded: false,
            bytes: &[],
        };

        assert_eq!(guard.transform(&context), None);
        assert!(listener.failures.lock()[0].contains("boom"));

        // A poisoned lock would refuse this
        assert!(lock.acquire());
    }

    #[test]
    fn unmatched_classes_pass_through() {
        let lock = Arc::new(CircularityLock::new());
        let listener = Arc::new(Recording::new());
        let matcher: Arc<dyn RawMatcher> =
            Arc::new(|name: &BinaryName, _: &Arc<ClassLoaderHandle>, _: bool| {
                name.as_str().starts_with("me/")
            });
        let guard =
            GuardedTransformer::new(lock, matcher, Arc::new(Reverse), listener.clone());

        let name = binary("java/lang/String");
        let loader = ClassLoaderHandle::bootstrap();
        let context = TransformContext {
            name: &name,
            loader: &loader,
            already_loaded: false,
            bytes: &[1, 2],
        };

        assert_eq!(guard.transform(&context), None);
        assert!(listener.transformed.lock().is_empty());
    }
}
