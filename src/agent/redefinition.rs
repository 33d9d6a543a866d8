use super::host::{ClassDefinition, ClassLoaderHandle, HostError, InstrumentationHost};
use super::transformer::AgentListener;
use crate::jvm::BinaryName;
use std::sync::Arc;

/// How redefinition work is divided into host calls
///
/// The host applies one call atomically, so the allocator also decides the blast radius of
/// a failure: everything in a failed batch stays untouched.
#[derive(Clone, Copy, Debug)]
pub enum BatchAllocator {
    /// All classes in a single call
    ForTotal,

    /// Fixed-size chunks, with one ragged chunk at the end
    ForFixedSize(usize),
}

impl BatchAllocator {
    pub fn batches(&self, work: Vec<ClassDefinition>) -> Vec<Vec<ClassDefinition>> {
        match self {
            BatchAllocator::ForTotal => {
                if work.is_empty() {
                    vec![]
                } else {
                    vec![work]
                }
            }
            BatchAllocator::ForFixedSize(size) => {
                let size = (*size).max(1);
                let mut batches = vec![];
                let mut current = Vec::with_capacity(size);
                for definition in work {
                    current.push(definition);
                    if current.len() == size {
                        batches.push(std::mem::take(&mut current));
                    }
                }
                if !current.is_empty() {
                    batches.push(current);
                }
                batches
            }
        }
    }
}

/// Reaction to a failed batch
#[derive(Clone, Copy, Debug)]
pub enum FailureHandler {
    /// Stop at the first failure; unattempted batches become pending work
    FailFast,

    /// Record the failure and keep applying the remaining batches
    RecordAndContinue,

    /// Keep applying and report nothing
    Suppress,
}

/// One failed host call
#[derive(Debug)]
pub struct BatchFailure {
    pub index: usize,
    pub classes: Vec<BinaryName>,
    pub error: HostError,
}

/// What a redefinition run did
#[derive(Debug, Default)]
pub struct RedefinitionOutcome {
    /// Classes whose new definition the host accepted
    pub applied: Vec<(BinaryName, Arc<ClassLoaderHandle>)>,

    /// Number of host calls that succeeded
    pub batches_applied: usize,

    /// Failures, as filtered by the failure handler
    pub failures: Vec<BatchFailure>,

    /// Classes that still need work, whether failed or never attempted
    pub pending: Vec<(BinaryName, Arc<ClassLoaderHandle>)>,
}

/// Drive a set of redefinitions through the host
pub fn run_redefinition(
    host: &dyn InstrumentationHost,
    work: Vec<ClassDefinition>,
    allocator: BatchAllocator,
    handler: FailureHandler,
    listener: &dyn AgentListener,
) -> RedefinitionOutcome {
    let batches = allocator.batches(work);
    log::debug!(
        "Redefining {} classes in {} batches",
        batches.iter().map(|batch| batch.len()).sum::<usize>(),
        batches.len(),
    );

    let mut outcome = RedefinitionOutcome::default();
    let mut stopped = false;
    for (index, batch) in batches.into_iter().enumerate() {
        if stopped {
            outcome
                .pending
                .extend(batch.into_iter().map(|d| (d.name, d.loader)));
            continue;
        }
        match host.redefine(&batch) {
            Ok(()) => {
                listener.on_batch_applied(index, batch.len());
                outcome.batches_applied += 1;
                outcome
                    .applied
                    .extend(batch.into_iter().map(|d| (d.name, d.loader)));
            }
            Err(error) => {
                listener.on_batch_failed(index, batch.len(), &error);
                let classes: Vec<BinaryName> =
                    batch.iter().map(|d| d.name.clone()).collect();
                outcome
                    .pending
                    .extend(batch.into_iter().map(|d| (d.name, d.loader)));
                match handler {
                    FailureHandler::FailFast => {
                        outcome.failures.push(BatchFailure {
                            index,
                            classes,
                            error,
                        });
                        stopped = true;
                    }
                    FailureHandler::RecordAndContinue => {
                        outcome.failures.push(BatchFailure {
                            index,
                            classes,
                            error,
                        });
                    }
                    FailureHandler::Suppress => {}
                }
            }
        }
    }
    outcome
}
