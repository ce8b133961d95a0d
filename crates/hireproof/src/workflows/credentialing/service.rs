use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::bias::CohortProvider;
use super::collectors::EvidenceCollector;
use super::config::PipelineConfig;
use super::domain::{
    ApplicationId, CandidateRef, CredentialDocument, CredentialStatus, FlagSeverity, JobSpec,
    PipelineStage,
};
use super::evidence::{keys, EvidenceFragment, EvidenceRecord, TestResult};
use super::orchestrator::{NextAction, Orchestrator, PipelineError};
use super::review::{ReviewId, ReviewResolution, ReviewSink};
use super::signer::{PassportArchive, PassportSigner, PassportView, SignedPassport};
use super::store::DocumentStore;

/// Candidate-facing projection of a document. Deliberately narrow: a paused
/// candidate sees only what is pending, a rejected candidate sees a
/// human-readable reason, and raw evidence never leaves the service.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatusView {
    pub application_id: String,
    pub status: &'static str,
    pub detail: String,
    pub stages_completed: Vec<&'static str>,
}

/// Application-facing entry point for the credentialing pipeline.
///
/// Owns id assignment and the paused-state transitions (test submission,
/// review resumption); everything between pauses is delegated to the
/// orchestrator.
pub struct CredentialService<S, Q> {
    store: Arc<S>,
    review: Arc<Q>,
    archive: Arc<dyn PassportArchive>,
    signer: PassportSigner,
    orchestrator: Orchestrator<S, Q>,
    config: PipelineConfig,
    sequence: AtomicU64,
}

impl<S, Q> CredentialService<S, Q>
where
    S: DocumentStore + 'static,
    Q: ReviewSink + 'static,
{
    pub fn new(
        store: Arc<S>,
        review: Arc<Q>,
        fraud: Arc<dyn EvidenceCollector>,
        collectors: Vec<Arc<dyn EvidenceCollector>>,
        cohorts: Arc<dyn CohortProvider>,
        archive: Arc<dyn PassportArchive>,
        config: PipelineConfig,
    ) -> Self {
        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&review),
            fraud,
            collectors,
            cohorts,
            Arc::clone(&archive),
            &config,
        );
        Self {
            store,
            review,
            archive,
            signer: PassportSigner::new(config.signing_secret.clone()),
            orchestrator,
            config,
            sequence: AtomicU64::new(0),
        }
    }

    /// Open a new credential document at the start of the pipeline.
    pub fn register(
        &self,
        candidate: CandidateRef,
        job: JobSpec,
    ) -> Result<CredentialDocument, PipelineError> {
        let id = self.next_application_id();
        let document = CredentialDocument::new(id, candidate, job);
        let document = self.store.insert(document)?;
        info!(application_id = %document.application_id.0, "credential application registered");
        Ok(document)
    }

    /// Execute exactly one pipeline stage.
    pub async fn advance(
        &self,
        id: &ApplicationId,
    ) -> Result<(CredentialDocument, NextAction), PipelineError> {
        self.orchestrator.advance(id).await
    }

    /// Drive the pipeline until it pauses, halts, or completes.
    pub async fn run(
        &self,
        id: &ApplicationId,
    ) -> Result<(CredentialDocument, NextAction), PipelineError> {
        loop {
            let (document, action) = self.orchestrator.advance(id).await?;
            if action != NextAction::Continue {
                return Ok((document, action));
            }
        }
    }

    /// Accept a technical test score for a document paused at the test gate.
    ///
    /// The score is merged into the skill assessment exactly once; a second
    /// submission is rejected rather than re-averaged. The document resumes
    /// at the bias audit on the next `advance`.
    pub fn submit_test_result(
        &self,
        id: &ApplicationId,
        score: f64,
    ) -> Result<CredentialDocument, PipelineError> {
        let mut document = self.load(id)?;

        if document.status != CredentialStatus::TestRequired {
            return Err(PipelineError::TestNotPending(document.status.label()));
        }
        if document.evidence(keys::TEST).is_some() {
            return Err(PipelineError::TestAlreadySubmitted);
        }

        let score = score.clamp(0.0, 100.0);
        let result = TestResult {
            score,
            passed: score >= self.config.test_pass_score,
            submitted_at: Utc::now(),
        };
        document.record_evidence(
            keys::TEST,
            EvidenceRecord::Collected(EvidenceFragment::Test(result)),
        );

        if let Some(EvidenceRecord::Collected(EvidenceFragment::Skills(assessment))) =
            document.evidence.get_mut(keys::SKILL)
        {
            assessment.confidence = ((assessment.confidence + score) / 2.0).clamp(0.0, 100.0);
            assessment.test_required = false;
            assessment.sources_used.push(keys::TEST.to_string());
        }

        document.complete_stage(PipelineStage::TestGate);
        document.status = CredentialStatus::Processing;
        document.current_stage = PipelineStage::BiasAudit;

        let document = self.store.save(document)?;
        info!(
            application_id = %document.application_id.0,
            score,
            "test result recorded, pipeline resumable"
        );
        Ok(document)
    }

    /// Resume a document paused for human review, once every open ticket has
    /// a decision. Flags stay on the document as a resolved audit trail.
    pub fn resume_after_review(
        &self,
        id: &ApplicationId,
    ) -> Result<CredentialDocument, PipelineError> {
        let mut document = self.load(id)?;

        if document.status != CredentialStatus::NeedsReview {
            return Err(PipelineError::NoPendingReview);
        }

        for flag in document.pending_flags() {
            let Some(ticket) = flag.review_id else {
                continue;
            };
            if self.review.resolution(&ReviewId(ticket))? == ReviewResolution::Pending {
                return Err(PipelineError::ReviewStillPending);
            }
        }

        document.resolve_pending_flags();
        document.status = CredentialStatus::Processing;

        let document = self.store.save(document)?;
        info!(application_id = %document.application_id.0, "review cleared, pipeline resumable");
        Ok(document)
    }

    pub fn status(&self, id: &ApplicationId) -> Result<CredentialStatusView, PipelineError> {
        let document = self.load(id)?;
        Ok(status_view(&document))
    }

    /// The full internal document, for operators and tests.
    pub fn document(&self, id: &ApplicationId) -> Result<CredentialDocument, PipelineError> {
        self.load(id)
    }

    pub fn passport(&self, id: &ApplicationId) -> Result<SignedPassport, PipelineError> {
        self.archive
            .fetch(&id.0)?
            .ok_or(PipelineError::NotSigned)
    }

    pub fn verify(&self, view: &PassportView, signature: &str) -> bool {
        self.signer.verify(view, signature)
    }

    /// Open a correcting document for an already-signed credential. The old
    /// passport stays valid until its holder re-fetches; the new document
    /// runs the whole pipeline from the start.
    pub fn supersede(&self, id: &ApplicationId) -> Result<CredentialDocument, PipelineError> {
        let previous = self.load(id)?;
        if previous.status != CredentialStatus::Completed
            || previous.evidence(keys::PASSPORT).is_none()
        {
            return Err(PipelineError::NotSupersedable);
        }

        let mut document = CredentialDocument::new(
            self.next_application_id(),
            previous.candidate.clone(),
            previous.job.clone(),
        );
        document.supersedes = Some(previous.application_id.clone());
        let document = self.store.insert(document)?;
        info!(
            application_id = %document.application_id.0,
            supersedes = %previous.application_id.0,
            "superseding credential application opened"
        );
        Ok(document)
    }

    fn load(&self, id: &ApplicationId) -> Result<CredentialDocument, PipelineError> {
        self.store.load(id)?.ok_or(PipelineError::NotFound)
    }

    fn next_application_id(&self) -> ApplicationId {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        ApplicationId(format!("app-{sequence:06}"))
    }
}

fn status_view(document: &CredentialDocument) -> CredentialStatusView {
    let detail = match document.status {
        CredentialStatus::Processing => "evaluation in progress".to_string(),
        CredentialStatus::TestRequired => "awaiting technical test submission".to_string(),
        CredentialStatus::NeedsReview => "awaiting reviewer decision".to_string(),
        CredentialStatus::Completed => {
            if document.evidence(keys::PASSPORT).is_some() {
                "credential issued".to_string()
            } else {
                "credential signing pending".to_string()
            }
        }
        CredentialStatus::Rejected => document
            .flags
            .iter()
            .filter(|flag| flag.severity == FlagSeverity::Critical)
            .map(|flag| flag.reason.clone())
            .next_back()
            .unwrap_or_else(|| "application rejected".to_string()),
    };

    CredentialStatusView {
        application_id: document.application_id.0.clone(),
        status: document.status.label(),
        detail,
        stages_completed: document
            .stages_completed
            .iter()
            .map(PipelineStage::label)
            .collect(),
    }
}
