//! Live instrumentation of classes a host has already loaded
//!
//! An [`Agent`] pairs a [`Transformer`] with an [`InstrumentationHost`]: installation hooks
//! future class loading and retrofits matching classes that are already live, batch by
//! batch. A [`CircularityLock`] keeps transformation from recursing into itself, failed
//! classes queue up for optional resubmission, and the resulting [`Installation`] can be
//! detached again, with or without restoring the original class files.

mod circularity;
mod controller;
mod host;
mod loader_cache;
mod redefinition;
mod resubmission;
mod transformer;

pub use circularity::CircularityLock;
pub use controller::{
    Agent, AgentError, AgentSettings, ClassResetResult, Installation, ResetMode,
};
pub use host::{
    same_loader, ClassDefinition, ClassLoaderHandle, HostError, InstrumentationHost,
    LoadedClass,
};
pub use loader_cache::{LoaderKey, LoaderScopedCache};
pub use redefinition::{
    run_redefinition, BatchAllocator, BatchFailure, FailureHandler, RedefinitionOutcome,
};
pub use resubmission::{
    CancellationToken, FixedRateScheduler, ResubmissionPolicy, ResubmissionScheduler,
};
pub use transformer::{
    AgentListener, ClassFileTransformer, GuardedTransformer, LogListener, RawMatcher,
    TransformContext, Transformer,
};
