use super::circularity::CircularityLock;
use super::host::{
    same_loader, ClassDefinition, ClassLoaderHandle, HostError, InstrumentationHost,
    LoadedClass,
};
use super::loader_cache::LoaderScopedCache;
use super::redefinition::{run_redefinition, BatchAllocator, FailureHandler, RedefinitionOutcome};
use super::resubmission::{CancellationToken, ResubmissionPolicy};
use super::transformer::{
    panic_message, AgentListener, ClassFileTransformer, GuardedTransformer, LogListener,
    RawMatcher, TransformContext, Transformer,
};
use crate::jvm::{BinaryName, Version};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Knobs for an agent installation
pub struct AgentSettings {
    /// How retrofit work is split into host calls
    pub batch_allocator: BatchAllocator,

    /// Reaction to failed host calls
    pub failure_handler: FailureHandler,

    /// Whether failed classes are retried later
    pub resubmission: ResubmissionPolicy,

    /// How long installation may wait for the circularity lock; `None` means do not wait
    pub lock_deadline: Option<Duration>,
}

impl AgentSettings {
    pub fn new() -> AgentSettings {
        AgentSettings {
            batch_allocator: BatchAllocator::ForTotal,
            failure_handler: FailureHandler::RecordAndContinue,
            resubmission: ResubmissionPolicy::Disabled,
            lock_deadline: None,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> AgentSettings {
        AgentSettings::new()
    }
}

/// Errors surfaced by installing or detaching an agent
#[derive(Debug)]
pub enum AgentError {
    /// The circularity lock could not be taken before the deadline
    LockUnavailable,

    /// The installation was already detached
    Detached,
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::LockUnavailable => f.write_str("circularity lock unavailable"),
            AgentError::Detached => f.write_str("agent already detached"),
        }
    }
}

impl std::error::Error for AgentError {}

/// One class as it was before instrumentation
struct SnapshotEntry {
    name: BinaryName,
    loader: Arc<ClassLoaderHandle>,
    bytes: Vec<u8>,
}

/// State shared between the installation handle and scheduled resubmission
struct InstallShared {
    host: Arc<dyn InstrumentationHost>,
    matcher: Arc<dyn RawMatcher>,
    transformer: Arc<dyn Transformer>,
    listener: Arc<dyn AgentListener>,
    allocator: BatchAllocator,
    handler: FailureHandler,
    lock: Arc<CircularityLock>,

    /// Classes instrumented so far, scoped by defining loader
    applied: LoaderScopedCache<HashSet<BinaryName>>,

    /// Pre-instrumentation class files, in discovery order
    snapshots: Mutex<Vec<SnapshotEntry>>,

    /// Classes awaiting another attempt
    queue: Mutex<Vec<(BinaryName, Arc<ClassLoaderHandle>)>>,

    detached: AtomicBool,
}

impl InstallShared {
    /// Instrument everything the host already loaded
    ///
    /// The caller holds the circularity lock: any class loading the host reports while a
    /// batch is applied finds the lock taken and passes through untouched.
    fn retrofit(&self) -> RedefinitionOutcome {
        let mut work = vec![];
        for class in self.host.loaded_classes() {
            if !self.host.is_modifiable(&class) {
                continue;
            }
            if !self.matcher.matches(&class.name, &class.loader, true) {
                continue;
            }
            self.listener.on_discovery(&class.name);
            if let Some(definition) = self.prepare(&class) {
                work.push(definition);
            }
        }
        self.apply(work)
    }

    /// Run prepared definitions through the host and account for the results
    fn apply(&self, work: Vec<ClassDefinition>) -> RedefinitionOutcome {
        let outcome = run_redefinition(
            self.host.as_ref(),
            work,
            self.allocator,
            self.handler,
            self.listener.as_ref(),
        );
        for (name, loader) in &outcome.applied {
            self.applied.update(loader, |names| {
                names.insert(name.clone());
            });
        }
        if !outcome.pending.is_empty() {
            self.queue.lock().extend(outcome.pending.iter().cloned());
        }
        outcome
    }

    /// Build one redefinition, snapshotting the original bytes first
    fn prepare(&self, class: &LoadedClass) -> Option<ClassDefinition> {
        if Version::of_class_file(&class.bytes).is_err() {
            self.listener
                .on_failure(&class.name, "class file header unreadable");
            return None;
        }
        self.snapshot(class);
        let context = TransformContext {
            name: &class.name,
            loader: &class.loader,
            already_loaded: true,
            bytes: &class.bytes,
        };
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| self.transformer.transform(&context)));
        match outcome {
            Ok(Ok(Some(bytes))) => {
                self.listener.on_transformed(&class.name);
                Some(ClassDefinition {
                    name: class.name.clone(),
                    loader: class.loader.clone(),
                    bytes,
                })
            }
            Ok(Ok(None)) => None,
            Ok(Err(error)) => {
                self.listener.on_failure(&class.name, &error.to_string());
                self.enqueue(class);
                None
            }
            Err(payload) => {
                self.listener.on_failure(&class.name, &panic_message(payload));
                self.enqueue(class);
                None
            }
        }
    }

    fn snapshot(&self, class: &LoadedClass) {
        let mut snapshots = self.snapshots.lock();
        let known = snapshots
            .iter()
            .any(|entry| entry.name == class.name && same_loader(&entry.loader, &class.loader));
        if !known {
            snapshots.push(SnapshotEntry {
                name: class.name.clone(),
                loader: class.loader.clone(),
                bytes: class.bytes.clone(),
            });
        }
    }

    fn enqueue(&self, class: &LoadedClass) {
        self.queue
            .lock()
            .push((class.name.clone(), class.loader.clone()));
    }

    /// Give queued classes another try
    ///
    /// A no-op once detached. When the lock is taken elsewhere the queue keeps everything
    /// for the next tick rather than wait inside the scheduler's thread.
    fn resubmit(&self) {
        if self.detached.load(Ordering::Acquire) {
            return;
        }
        let drained = std::mem::take(&mut *self.queue.lock());
        if drained.is_empty() {
            return;
        }
        if !self.lock.acquire() {
            self.queue.lock().extend(drained);
            return;
        }

        let mut todo: Vec<(BinaryName, Arc<ClassLoaderHandle>)> = vec![];
        for (name, loader) in drained {
            let duplicate = todo
                .iter()
                .any(|(n, l)| n == &name && same_loader(l, &loader));
            if !duplicate {
                todo.push((name, loader));
            }
        }

        let mut work = vec![];
        for (name, loader) in todo {
            let class = match self.host.loaded_class(&name, &loader) {
                Some(class) => class,
                None => continue,
            };
            if !self.host.is_modifiable(&class) {
                continue;
            }
            if !self.matcher.matches(&class.name, &class.loader, true) {
                continue;
            }
            let done = self
                .applied
                .read(&loader, |names| names.contains(&name))
                .unwrap_or(false);
            if done {
                continue;
            }
            if let Some(definition) = self.prepare(&class) {
                work.push(definition);
            }
        }
        self.apply(work);
        self.lock.release();
    }
}

/// Entry point for live instrumentation of loaded classes
pub struct Agent {
    host: Arc<dyn InstrumentationHost>,
    lock: Arc<CircularityLock>,
    settings: AgentSettings,
    listener: Arc<dyn AgentListener>,
}

impl Agent {
    pub fn new(host: Arc<dyn InstrumentationHost>, settings: AgentSettings) -> Agent {
        Agent::with_listener(host, settings, Arc::new(LogListener))
    }

    pub fn with_listener(
        host: Arc<dyn InstrumentationHost>,
        settings: AgentSettings,
        listener: Arc<dyn AgentListener>,
    ) -> Agent {
        Agent::assembled(host, Arc::new(CircularityLock::new()), settings, listener)
    }

    /// Full control over the parts; agents sharing one lock never transform concurrently
    pub fn assembled(
        host: Arc<dyn InstrumentationHost>,
        lock: Arc<CircularityLock>,
        settings: AgentSettings,
        listener: Arc<dyn AgentListener>,
    ) -> Agent {
        Agent {
            host,
            lock,
            settings,
            listener,
        }
    }

    /// Hook future class loading and retrofit matching classes that are already live
    pub fn install(
        self,
        matcher: Arc<dyn RawMatcher>,
        transformer: Arc<dyn Transformer>,
    ) -> Result<Installation, AgentError> {
        let Agent {
            host,
            lock,
            settings,
            listener,
        } = self;
        let AgentSettings {
            batch_allocator,
            failure_handler,
            resubmission,
            lock_deadline,
        } = settings;

        // Hook loading first so no class slips between the retrofit pass and the hook
        let guarded: Arc<dyn ClassFileTransformer> = Arc::new(GuardedTransformer::new(
            lock.clone(),
            matcher.clone(),
            transformer.clone(),
            listener.clone(),
        ));
        host.add_transformer(guarded.clone());

        let acquired = match lock_deadline {
            Some(deadline) => lock.acquire_with_deadline(deadline),
            None => lock.acquire(),
        };
        if !acquired {
            host.remove_transformer(&guarded);
            return Err(AgentError::LockUnavailable);
        }

        let shared = Arc::new(InstallShared {
            host,
            matcher,
            transformer,
            listener,
            allocator: batch_allocator,
            handler: failure_handler,
            lock: lock.clone(),
            applied: LoaderScopedCache::new(),
            snapshots: Mutex::new(vec![]),
            queue: Mutex::new(vec![]),
            detached: AtomicBool::new(false),
        });
        let initial = shared.retrofit();
        lock.release();
        log::debug!(
            "Installed: {} classes redefined, {} pending",
            initial.applied.len(),
            initial.pending.len(),
        );

        let token = match resubmission {
            ResubmissionPolicy::Enabled { scheduler } => {
                let job = shared.clone();
                Some(scheduler.schedule(Box::new(move || job.resubmit())))
            }
            ResubmissionPolicy::Disabled => None,
        };

        Ok(Installation {
            shared,
            guarded,
            token: Mutex::new(token),
            initial,
        })
    }
}

/// How instrumented classes are treated on detach
pub enum ResetMode {
    /// Unhook only; instrumented classes stay instrumented
    DetachOnly,

    /// Redefine every instrumented class back to its snapshot
    RedefineToSnapshot,
}

/// Per-class outcome of a reset
#[derive(Debug)]
pub struct ClassResetResult {
    pub name: BinaryName,
    pub result: Result<(), HostError>,
}

/// Live handle to an installed agent
pub struct Installation {
    shared: Arc<InstallShared>,
    guarded: Arc<dyn ClassFileTransformer>,
    token: Mutex<Option<Box<dyn CancellationToken>>>,
    initial: RedefinitionOutcome,
}

impl Installation {
    /// What the retrofit pass at installation did
    pub fn initial_outcome(&self) -> &RedefinitionOutcome {
        &self.initial
    }

    pub fn is_installed(&self) -> bool {
        !self.shared.detached.load(Ordering::Acquire)
    }

    /// Drive the pending queue once, off schedule
    pub fn resubmit(&self) {
        self.shared.resubmit();
    }

    /// Detach the agent, optionally restoring original class files
    ///
    /// Restoration works class by class, so one stubborn class cannot keep every other
    /// one instrumented.
    pub fn reset(&self, mode: ResetMode) -> Result<Vec<ClassResetResult>, AgentError> {
        let newly_detached = self
            .shared
            .detached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !newly_detached {
            return Err(AgentError::Detached);
        }

        let token = self.token.lock().take();
        if let Some(token) = token {
            token.cancel();
        }
        self.shared.host.remove_transformer(&self.guarded);

        let mut results = vec![];
        if let ResetMode::RedefineToSnapshot = mode {
            let snapshots = std::mem::take(&mut *self.shared.snapshots.lock());
            for entry in snapshots {
                let name = entry.name.clone();
                let definition = ClassDefinition {
                    name: entry.name,
                    loader: entry.loader,
                    bytes: entry.bytes,
                };
                let result = self.shared.host.redefine(&[definition]);
                self.shared.listener.on_reset_class(&name, &result);
                results.push(ClassResetResult { name, result });
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::Name;
    use crate::transform::BuildError;

    fn binary(name: &str) -> BinaryName {
        BinaryName::from_string(String::from(name)).unwrap()
    }

    fn class_blob(tag: u8) -> Vec<u8> {
        vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34, tag]
    }

    struct FakeHost {
        classes: Mutex<Vec<LoadedClass>>,
        transformers: Mutex<Vec<Arc<dyn ClassFileTransformer>>>,
        failing: Mutex<HashSet<String>>,
    }

    impl FakeHost {
        fn with_classes(classes: Vec<LoadedClass>) -> FakeHost {
            FakeHost {
                classes: Mutex::new(classes),
                transformers: Mutex::new(vec![]),
                failing: Mutex::new(HashSet::new()),
            }
        }

        fn bytes_of(&self, name: &str) -> Vec<u8> {
            self.classes
                .lock()
                .iter()
                .find(|c| c.name.as_str() == name)
                .map(|c| c.bytes.clone())
                .unwrap()
        }

        fn transformer_count(&self) -> usize {
            self.transformers.lock().len()
        }
    }

    impl InstrumentationHost for FakeHost {
        fn add_transformer(&self, transformer: Arc<dyn ClassFileTransformer>) {
            self.transformers.lock().push(transformer);
        }

        fn remove_transformer(&self, transformer: &Arc<dyn ClassFileTransformer>) -> bool {
            let mut transformers = self.transformers.lock();
            let target = Arc::as_ptr(transformer) as *const ();
            let before = transformers.len();
            transformers.retain(|t| Arc::as_ptr(t) as *const () != target);
            transformers.len() < before
        }

        fn loaded_classes(&self) -> Vec<LoadedClass> {
            self.classes.lock().clone()
        }

        fn loaded_class(
            &self,
            name: &BinaryName,
            loader: &Arc<ClassLoaderHandle>,
        ) -> Option<LoadedClass> {
            self.classes
                .lock()
                .iter()
                .find(|c| &c.name == name && same_loader(&c.loader, loader))
                .cloned()
        }

        fn is_modifiable(&self, class: &LoadedClass) -> bool {
            class.modifiable
        }

        fn redefine(&self, definitions: &[ClassDefinition]) -> Result<(), HostError> {
            let failing = self.failing.lock();
            if definitions.iter().any(|d| failing.contains(d.name.as_str())) {
                return Err(HostError(String::from("scripted failure")));
            }
            let mut classes = self.classes.lock();
            for definition in definitions {
                for class in classes.iter_mut() {
                    if class.name == definition.name
                        && same_loader(&class.loader, &definition.loader)
                    {
                        class.bytes = definition.bytes.clone();
                    }
                }
            }
            Ok(())
        }
    }

    fn loaded(name: &str, loader: &Arc<ClassLoaderHandle>, tag: u8) -> LoadedClass {
        LoadedClass {
            name: binary(name),
            loader: loader.clone(),
            bytes: class_blob(tag),
            modifiable: true,
        }
    }

    struct AppendByte(u8);

    impl Transformer for AppendByte {
        fn transform(
            &self,
            context: &TransformContext<'_>,
        ) -> Result<Option<Vec<u8>>, BuildError> {
            let mut bytes = context.bytes.to_vec();
            bytes.push(self.0);
            Ok(Some(bytes))
        }
    }

    fn match_prefix(prefix: &'static str) -> Arc<dyn RawMatcher> {
        Arc::new(move |name: &BinaryName, _: &Arc<ClassLoaderHandle>, _: bool| {
            name.as_str().starts_with(prefix)
        })
    }

    #[test]
    fn installation_retrofits_matching_classes() {
        let loader = ClassLoaderHandle::named("app");
        let host = Arc::new(FakeHost::with_classes(vec![
            loaded("me/Foo", &loader, 1),
            loaded("me/Bar", &loader, 2),
            loaded("java/lang/String", &loader, 3),
        ]));

        let agent = Agent::new(host.clone(), AgentSettings::new());
        let installation = agent
            .install(match_prefix("me/"), Arc::new(AppendByte(0xAA)))
            .unwrap();

        assert!(installation.is_installed());
        assert_eq!(installation.initial_outcome().applied.len(), 2);
        assert_eq!(host.bytes_of("me/Foo").last(), Some(&0xAA));
        assert_eq!(host.bytes_of("java/lang/String"), class_blob(3));
        assert_eq!(host.transformer_count(), 1);
    }

    #[test]
    fn a_held_lock_fails_installation_and_unhooks() {
        let loader = ClassLoaderHandle::named("app");
        let host = Arc::new(FakeHost::with_classes(vec![loaded("me/Foo", &loader, 1)]));
        let lock = Arc::new(CircularityLock::new());
        assert!(lock.acquire());

        let mut settings = AgentSettings::new();
        settings.lock_deadline = Some(Duration::from_millis(10));
        let agent = Agent::assembled(host.clone(), lock, settings, Arc::new(LogListener));

        match agent.install(match_prefix("me/"), Arc::new(AppendByte(1))) {
            Err(AgentError::LockUnavailable) => {}
            other => panic!("expected lock unavailability, got {:?}", other.map(|_| ())),
        }
        assert_eq!(host.transformer_count(), 0);
    }

    #[test]
    fn failed_classes_queue_up_and_resubmission_retries_them() {
        struct FailOnce {
            failed: AtomicBool,
        }

        impl Transformer for FailOnce {
            fn transform(
                &self,
                context: &TransformContext<'_>,
            ) -> Result<Option<Vec<u8>>, BuildError> {
                if self
                    .failed
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    return Err(BuildError::UnresolvedType(String::from(
                        context.name.as_str(),
                    )));
                }
                let mut bytes = context.bytes.to_vec();
                bytes.push(0xBB);
                Ok(Some(bytes))
            }
        }

        let loader = ClassLoaderHandle::named("app");
        let host = Arc::new(FakeHost::with_classes(vec![loaded("me/Foo", &loader, 1)]));
        let agent = Agent::new(host.clone(), AgentSettings::new());
        let installation = agent
            .install(
                match_prefix("me/"),
                Arc::new(FailOnce {
                    failed: AtomicBool::new(false),
                }),
            )
            .unwrap();

        assert!(installation.initial_outcome().applied.is_empty());
        assert_eq!(host.bytes_of("me/Foo"), class_blob(1));

        installation.resubmit();
        assert_eq!(host.bytes_of("me/Foo").last(), Some(&0xBB));

        // The queue is spent; nothing is transformed twice
        installation.resubmit();
        let after = host.bytes_of("me/Foo");
        assert_eq!(after.iter().filter(|b| **b == 0xBB).count(), 1);
    }

    #[test]
    fn reset_restores_snapshots_class_by_class() {
        let loader = ClassLoaderHandle::named("app");
        let host = Arc::new(FakeHost::with_classes(vec![
            loaded("me/Foo", &loader, 1),
            loaded("me/Bar", &loader, 2),
        ]));
        let agent = Agent::new(host.clone(), AgentSettings::new());
        let installation = agent
            .install(match_prefix("me/"), Arc::new(AppendByte(0xAA)))
            .unwrap();
        assert_eq!(host.bytes_of("me/Foo").last(), Some(&0xAA));

        // One class refuses to go back; the other must still be restored
        host.failing.lock().insert(String::from("me/Foo"));
        let results = installation.reset(ResetMode::RedefineToSnapshot).unwrap();

        assert_eq!(results.len(), 2);
        let foo = results.iter().find(|r| r.name.as_str() == "me/Foo").unwrap();
        let bar = results.iter().find(|r| r.name.as_str() == "me/Bar").unwrap();
        assert!(foo.result.is_err());
        assert!(bar.result.is_ok());
        assert_eq!(host.bytes_of("me/Bar"), class_blob(2));
        assert_eq!(host.transformer_count(), 0);
        assert!(!installation.is_installed());

        match installation.reset(ResetMode::DetachOnly) {
            Err(AgentError::Detached) => {}
            other => panic!("expected a detached error, got {:?}", other),
        }
    }
}
