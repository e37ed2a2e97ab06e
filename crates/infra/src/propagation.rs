//! Structured fan-out over subjects.
//!
//! Every branch runs to completion and reports its own outcome; the join is
//! on all branches, not on the first response or the first error.

use std::future::Future;

use futures::future::join_all;
use serde::Serialize;

use warden_core::SubjectId;

use crate::error::{BranchFailure, RegistryError};

/// Outcome of every branch of a fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FanOutReport {
    pub succeeded: Vec<SubjectId>,
    pub failed: Vec<BranchFailure>,
}

impl FanOutReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// `Ok(succeeded)` when every branch completed, `PartialPropagation` otherwise.
    pub fn into_result(self) -> Result<Vec<SubjectId>, RegistryError> {
        if self.failed.is_empty() {
            Ok(self.succeeded)
        } else {
            Err(RegistryError::PartialPropagation {
                succeeded: self.succeeded,
                failed: self.failed,
            })
        }
    }
}

/// Run `branch` once per subject concurrently and collect every outcome.
pub async fn fan_out<I, F, Fut>(subjects: I, branch: F) -> FanOutReport
where
    I: IntoIterator<Item = SubjectId>,
    F: Fn(SubjectId) -> Fut,
    Fut: Future<Output = Result<(), RegistryError>>,
{
    let branches = subjects.into_iter().map(|subject| {
        let fut = branch(subject.clone());
        async move { (subject, fut.await) }
    });

    let mut report = FanOutReport::default();
    for (subject, outcome) in join_all(branches).await {
        match outcome {
            Ok(()) => report.succeeded.push(subject),
            Err(e) => {
                tracing::warn!(subject = %subject, error = %e, "fan-out branch failed");
                report.failed.push(BranchFailure {
                    subject,
                    error: e.to_string(),
                });
            }
        }
    }
    report
}
