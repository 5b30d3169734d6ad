//! Outliner error types.

use crate::ir::{BlockId, MethodRef};

use super::Phase;

/// Result type for outlining passes.
pub type OutlineResult<T> = Result<T, OutlineError>;

/// Failures of the outlining pipeline.
///
/// Everything except [`OutlineError::ThreadPool`] is an internal consistency
/// fault: a bug in the pipeline, never bad input. An ineligible window is
/// not an error at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutlineError {
    /// Rewriting found a window that was never recorded as a site.
    SiteNotFound {
        method: MethodRef,
        block: BlockId,
        start: usize,
        end: usize,
    },
    /// A template cannot be turned into a callable outline.
    SignatureMismatch { template: String, reason: String },
    /// Sites recorded for a generated outline were not consumed by rewriting.
    SitesRemaining { outline: MethodRef, remaining: usize },
    /// The holder was requested before any site was recorded.
    NoSitesRecorded,
    /// A pass was invoked out of order.
    PassOrder { expected: Phase, actual: Phase },
    /// The worker pool could not be created.
    ThreadPool(String),
}

impl OutlineError {
    /// Whether this failure indicates a bug in the pipeline itself
    pub fn is_internal(&self) -> bool {
        !matches!(self, OutlineError::ThreadPool(_))
    }
}

impl std::fmt::Display for OutlineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutlineError::SiteNotFound {
                method,
                block,
                start,
                end,
            } => write!(
                f,
                "Outline site {}[{}..{}) in block {} was not recorded",
                method, start, end, block.0
            ),
            OutlineError::SignatureMismatch { template, reason } => {
                write!(f, "Cannot build outline signature ({}):\n{}", reason, template)
            }
            OutlineError::SitesRemaining { outline, remaining } => write!(
                f,
                "{} outline site(s) of {} were not found again",
                remaining, outline
            ),
            OutlineError::NoSitesRecorded => {
                write!(f, "Outline holder requested before any site was recorded")
            }
            OutlineError::PassOrder { expected, actual } => write!(
                f,
                "Outlining pass out of order: expected {:?}, found {:?}",
                expected, actual
            ),
            OutlineError::ThreadPool(msg) => write!(f, "Failed to start worker pool: {}", msg),
        }
    }
}

impl std::error::Error for OutlineError {}
