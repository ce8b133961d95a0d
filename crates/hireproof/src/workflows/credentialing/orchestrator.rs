use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use super::aggregation::SkillAggregator;
use super::bias::{BiasAuditEngine, CohortProvider};
use super::collectors::{collect_with_retry, CollectorError, EvidenceCollector};
use super::config::{PipelineConfig, RetrySettings};
use super::domain::{
    ApplicationId, CredentialDocument, CredentialStatus, FlagSeverity, PipelineStage, ReviewFlag,
};
use super::evidence::{
    keys, BiasAction, BiasAuditReport, BiasScope, EvidenceFragment, EvidenceRecord, FraudSignal,
};
use super::matching::MatchingEngine;
use super::review::{ReviewError, ReviewSink};
use super::signer::{PassportArchive, PassportArchiveError, PassportSigner, SigningError};
use super::store::{DocumentStore, StoreError};

/// What the caller should do after one `advance` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    Continue,
    PauseForTest,
    PauseForReview,
    HaltRejected,
    Done,
}

/// Pipeline error taxonomy. Collector-level failures are absorbed into
/// degraded evidence and never appear here; only state-machine-level and
/// boundary failures surface to the caller.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("credential document not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Archive(#[from] PassportArchiveError),
    #[error("fraud screening unavailable: {0}")]
    FraudCheckUnavailable(String),
    #[error("document is missing {0} evidence")]
    MissingEvidence(&'static str),
    #[error("test submission only valid while status is test_required, found {0}")]
    TestNotPending(&'static str),
    #[error("test result already submitted")]
    TestAlreadySubmitted,
    #[error("document is not paused for review")]
    NoPendingReview,
    #[error("review decision still pending")]
    ReviewStillPending,
    #[error("no signed passport for this application")]
    NotSigned,
    #[error("only completed, signed credentials can be superseded")]
    NotSupersedable,
}

/// Drives one credential document through the fixed stage order, exactly one
/// stage (or one fan-out group) per `advance` call.
///
/// Every transition is persisted through the store's optimistic-concurrency
/// `save` before returning, so a crashed run resumes at `current_stage` from
/// the last persisted document and never re-runs a completed stage.
pub struct Orchestrator<S, Q> {
    store: Arc<S>,
    review: Arc<Q>,
    fraud: Arc<dyn EvidenceCollector>,
    collectors: Vec<Arc<dyn EvidenceCollector>>,
    cohorts: Arc<dyn CohortProvider>,
    archive: Arc<dyn PassportArchive>,
    aggregator: SkillAggregator,
    bias: BiasAuditEngine,
    matching: MatchingEngine,
    signer: PassportSigner,
    retry: RetrySettings,
}

impl<S, Q> Orchestrator<S, Q>
where
    S: DocumentStore + 'static,
    Q: ReviewSink + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        review: Arc<Q>,
        fraud: Arc<dyn EvidenceCollector>,
        collectors: Vec<Arc<dyn EvidenceCollector>>,
        cohorts: Arc<dyn CohortProvider>,
        archive: Arc<dyn PassportArchive>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            review,
            fraud,
            collectors,
            cohorts,
            archive,
            aggregator: SkillAggregator::new(config.test_confidence_threshold),
            bias: BiasAuditEngine::new(config.bias.clone()),
            matching: MatchingEngine::new(config.match_bands),
            signer: PassportSigner::new(config.signing_secret.clone()),
            retry: config.retry,
        }
    }

    /// Execute the stage named by `current_stage`, persist, and report what
    /// comes next. Paused and terminal documents are returned untouched.
    pub async fn advance(
        &self,
        id: &ApplicationId,
    ) -> Result<(CredentialDocument, NextAction), PipelineError> {
        let mut document = self.store.load(id)?.ok_or(PipelineError::NotFound)?;

        match document.status {
            CredentialStatus::Rejected => return Ok((document, NextAction::HaltRejected)),
            CredentialStatus::TestRequired => return Ok((document, NextAction::PauseForTest)),
            CredentialStatus::NeedsReview => return Ok((document, NextAction::PauseForReview)),
            CredentialStatus::Completed if document.evidence(keys::PASSPORT).is_some() => {
                return Ok((document, NextAction::Done));
            }
            CredentialStatus::Completed | CredentialStatus::Processing => {}
        }

        let stage = document.current_stage;
        let action = match stage {
            PipelineStage::FraudCheck => self.run_fraud_check(&mut document).await?,
            PipelineStage::EvidenceCollection => self.run_evidence_collection(&mut document).await,
            PipelineStage::SkillAggregation => self.run_skill_aggregation(&mut document),
            PipelineStage::TestGate => NextAction::PauseForTest,
            PipelineStage::BiasAudit => self.run_bias_audit(&mut document)?,
            PipelineStage::Matching => self.run_matching(&mut document)?,
            PipelineStage::Passport => self.run_passport(&mut document)?,
        };

        let document = self.store.save(document)?;
        info!(
            application_id = %document.application_id.0,
            stage = stage.label(),
            status = document.status.label(),
            "pipeline stage executed"
        );
        Ok((document, action))
    }

    /// Fraud screening is not best-effort: an unreachable screener surfaces
    /// as an error with the document untouched, ready for a clean retry.
    async fn run_fraud_check(
        &self,
        document: &mut CredentialDocument,
    ) -> Result<NextAction, PipelineError> {
        let signal = self.screen_fraud(&document.candidate).await?;
        let severity = signal.severity;
        let summary = signal.summary.clone();
        document.record_evidence(
            keys::FRAUD,
            EvidenceRecord::Collected(EvidenceFragment::Fraud(signal)),
        );
        document.complete_stage(PipelineStage::FraudCheck);

        if severity == FlagSeverity::Critical {
            document.push_flag(ReviewFlag::new(
                PipelineStage::FraudCheck,
                FlagSeverity::Critical,
                summary,
            ));
            document.status = CredentialStatus::Rejected;
            warn!(application_id = %document.application_id.0, "critical fraud signal, rejecting");
            return Ok(NextAction::HaltRejected);
        }

        document.current_stage = PipelineStage::EvidenceCollection;
        if severity.pauses_pipeline() {
            self.pause_for_review(
                document,
                ReviewFlag::new(PipelineStage::FraudCheck, severity, summary),
            )?;
            return Ok(NextAction::PauseForReview);
        }

        Ok(NextAction::Continue)
    }

    async fn screen_fraud(
        &self,
        candidate: &super::domain::CandidateRef,
    ) -> Result<FraudSignal, PipelineError> {
        let mut last_error = String::new();
        for attempt in 0..self.retry.max_attempts {
            let call = self.fraud.evaluate(candidate);
            match tokio::time::timeout(self.retry.call_timeout, call).await {
                Ok(Ok(EvidenceFragment::Fraud(signal))) => return Ok(signal),
                Ok(Ok(_)) => {
                    return Err(PipelineError::FraudCheckUnavailable(
                        "screener returned a non-fraud payload".to_string(),
                    ));
                }
                Ok(Err(CollectorError::Invalid(reason))) => {
                    return Err(PipelineError::FraudCheckUnavailable(reason));
                }
                Ok(Err(CollectorError::Unavailable(reason))) => last_error = reason,
                Err(_) => {
                    last_error =
                        format!("timed out after {}s", self.retry.call_timeout.as_secs());
                }
            }
            if attempt + 1 < self.retry.max_attempts {
                tokio::time::sleep(self.retry.base_backoff * 2u32.pow(attempt)).await;
            }
        }
        Err(PipelineError::FraudCheckUnavailable(last_error))
    }

    /// Fan out to every configured collector concurrently and join once all
    /// calls resolved to success, degraded evidence, or timeout. No
    /// collector blocks another; results are order-independent.
    async fn run_evidence_collection(&self, document: &mut CredentialDocument) -> NextAction {
        let candidate = document.candidate.clone();
        let calls = self.collectors.iter().map(|collector| {
            let candidate = candidate.clone();
            async move {
                let record = collect_with_retry(collector, &candidate, &self.retry).await;
                (collector.name(), record)
            }
        });

        for (name, record) in join_all(calls).await {
            document.record_evidence(name, record);
        }

        document.complete_stage(PipelineStage::EvidenceCollection);
        document.current_stage = PipelineStage::SkillAggregation;
        NextAction::Continue
    }

    fn run_skill_aggregation(&self, document: &mut CredentialDocument) -> NextAction {
        let assessment = self.aggregator.aggregate(&document.evidence);
        let test_required = assessment.test_required;
        document.record_evidence(
            keys::SKILL,
            EvidenceRecord::Collected(EvidenceFragment::Skills(assessment)),
        );
        document.complete_stage(PipelineStage::SkillAggregation);

        if test_required {
            document.status = CredentialStatus::TestRequired;
            document.current_stage = PipelineStage::TestGate;
            NextAction::PauseForTest
        } else {
            document.current_stage = PipelineStage::BiasAudit;
            NextAction::Continue
        }
    }

    fn run_bias_audit(
        &self,
        document: &mut CredentialDocument,
    ) -> Result<NextAction, PipelineError> {
        let report = self.bias.audit(self.cohorts.as_ref());
        let flagged = report.action == BiasAction::FlagForReview;
        let detail = report
            .details
            .iter()
            .map(|(attribute, gap)| format!("{attribute}: {gap:+.1}"))
            .collect::<Vec<_>>()
            .join(", ");
        document.record_evidence(
            keys::BIAS_AUDIT,
            EvidenceRecord::Collected(EvidenceFragment::BiasAudit(report)),
        );
        document.complete_stage(PipelineStage::BiasAudit);
        document.current_stage = PipelineStage::Matching;

        if flagged {
            self.pause_for_review(
                document,
                ReviewFlag::new(
                    PipelineStage::BiasAudit,
                    FlagSeverity::High,
                    format!("systemic scoring gap across protected attributes ({detail})"),
                ),
            )?;
            return Ok(NextAction::PauseForReview);
        }

        Ok(NextAction::Continue)
    }

    fn run_matching(
        &self,
        document: &mut CredentialDocument,
    ) -> Result<NextAction, PipelineError> {
        let skills = match document.evidence(keys::SKILL).and_then(|r| r.fragment()) {
            Some(EvidenceFragment::Skills(assessment)) => assessment.clone(),
            _ => return Err(PipelineError::MissingEvidence("skill")),
        };
        let test = match document.evidence(keys::TEST).and_then(|r| r.fragment()) {
            Some(EvidenceFragment::Test(result)) => Some(result.clone()),
            _ => None,
        };
        let bias = match document
            .evidence(keys::BIAS_AUDIT)
            .and_then(|r| r.fragment())
        {
            Some(EvidenceFragment::BiasAudit(report)) => report.clone(),
            _ => BiasAuditReport {
                bias_detected: false,
                scope: BiasScope::None,
                details: Default::default(),
                action: BiasAction::ProceedToMatching,
            },
        };

        let report = self
            .matching
            .score(&document.job, &skills, test.as_ref(), &bias);
        document.record_evidence(
            keys::MATCHING,
            EvidenceRecord::Collected(EvidenceFragment::Matching(report)),
        );
        document.complete_stage(PipelineStage::Matching);
        document.status = CredentialStatus::Completed;
        document.current_stage = PipelineStage::Passport;
        Ok(NextAction::Continue)
    }

    /// Sign exactly once. A signing failure leaves the document completed
    /// but unsigned; a later `advance` retries. No passport is ever minted
    /// for a rejected candidate because rejection halts before this stage.
    fn run_passport(
        &self,
        document: &mut CredentialDocument,
    ) -> Result<NextAction, PipelineError> {
        if document.evidence(keys::PASSPORT).is_some() {
            return Ok(NextAction::Done);
        }

        let passport = self.signer.issue(document)?;
        self.archive.store(passport.clone())?;
        document.record_evidence(
            keys::PASSPORT,
            EvidenceRecord::Collected(EvidenceFragment::Passport(passport.receipt())),
        );
        document.complete_stage(PipelineStage::Passport);
        Ok(NextAction::Done)
    }

    fn pause_for_review(
        &self,
        document: &mut CredentialDocument,
        mut flag: ReviewFlag,
    ) -> Result<(), PipelineError> {
        let ticket = self.review.enqueue(&flag)?;
        flag.review_id = Some(ticket.0);
        document.push_flag(flag);
        document.status = CredentialStatus::NeedsReview;
        Ok(())
    }
}
