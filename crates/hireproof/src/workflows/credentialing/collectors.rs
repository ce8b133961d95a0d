use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::config::RetrySettings;
use super::domain::CandidateRef;
use super::evidence::{EvidenceFragment, EvidenceRecord};

/// Cost/latency routing hint for collectors that can run against either a
/// local model or a paid cloud model. Purely a constructor-time trade-off on
/// the collector boundary; the orchestrator never inspects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CostTier {
    #[default]
    Local,
    Cloud,
}

/// Error surface of an external evidence collector.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// Transient network/timeout failure; safe to retry.
    #[error("collector unavailable: {0}")]
    Unavailable(String),
    /// The collector rejected the candidate reference; retrying cannot help.
    #[error("invalid candidate reference: {0}")]
    Invalid(String),
}

/// One external evidence source behind a uniform retryable-call contract.
///
/// Implementations must be read-only with respect to the candidate: the
/// harness retries freely on [`CollectorError::Unavailable`].
#[async_trait]
pub trait EvidenceCollector: Send + Sync {
    /// Evidence map key for this collector, e.g. `"github"`.
    fn name(&self) -> &'static str;

    async fn evaluate(&self, candidate: &CandidateRef) -> Result<EvidenceFragment, CollectorError>;
}

/// Drive one collector call through the bounded retry policy.
///
/// Transient failures and timeouts back off exponentially (base * 2^attempt)
/// and retry up to `max_attempts`; invalid-reference errors are terminal on
/// the first response. Exhaustion degrades to [`EvidenceRecord::Missing`]
/// rather than erroring, so one dead source never takes the pipeline down.
pub async fn collect_with_retry(
    collector: &Arc<dyn EvidenceCollector>,
    candidate: &CandidateRef,
    retry: &RetrySettings,
) -> EvidenceRecord {
    let mut last_error = String::new();

    for attempt in 0..retry.max_attempts {
        let call = collector.evaluate(candidate);
        match tokio::time::timeout(retry.call_timeout, call).await {
            Ok(Ok(fragment)) => return EvidenceRecord::Collected(fragment),
            Ok(Err(CollectorError::Invalid(reason))) => {
                warn!(
                    collector = collector.name(),
                    %reason,
                    "collector rejected candidate reference"
                );
                return EvidenceRecord::Missing {
                    error: format!("invalid candidate reference: {reason}"),
                };
            }
            Ok(Err(CollectorError::Unavailable(reason))) => {
                warn!(
                    collector = collector.name(),
                    attempt = attempt + 1,
                    %reason,
                    "collector unavailable"
                );
                last_error = format!("collector unavailable: {reason}");
            }
            Err(_) => {
                warn!(
                    collector = collector.name(),
                    attempt = attempt + 1,
                    timeout_secs = retry.call_timeout.as_secs(),
                    "collector call timed out"
                );
                last_error = format!(
                    "collector timed out after {}s",
                    retry.call_timeout.as_secs()
                );
            }
        }

        if attempt + 1 < retry.max_attempts {
            tokio::time::sleep(retry.base_backoff * 2u32.pow(attempt)).await;
        }
    }

    EvidenceRecord::Missing { error: last_error }
}
