use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::evidence::EvidenceRecord;

/// Identifier wrapper for one candidate-application pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Opaque handles the evidence collectors resolve on their own side.
///
/// Nothing here is interpreted by the orchestrator; absent handles simply mean
/// the matching collector reports degraded evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRef {
    pub candidate_id: String,
    pub resume_key: Option<String>,
    pub github_login: Option<String>,
    pub leetcode_handle: Option<String>,
    pub profile_url: Option<String>,
}

/// Requirement tiers for a job posting. Core requirements can never silently
/// fail a candidate; frameworks only weigh on the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementTier {
    Core,
    Framework,
}

/// Single skill requirement with its scoring weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequirement {
    pub skill: String,
    pub tier: RequirementTier,
    pub weight: f64,
}

impl JobRequirement {
    pub fn core(skill: impl Into<String>) -> Self {
        Self {
            skill: skill.into(),
            tier: RequirementTier::Core,
            weight: 3.0,
        }
    }

    pub fn framework(skill: impl Into<String>) -> Self {
        Self {
            skill: skill.into(),
            tier: RequirementTier::Framework,
            weight: 1.0,
        }
    }
}

/// Snapshot of the role the candidate is being credentialed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub title: String,
    pub requirements: Vec<JobRequirement>,
}

/// Ordered pipeline stages. `current_stage` always names the stage about to
/// run (or awaiting resume), never one already completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    FraudCheck,
    EvidenceCollection,
    SkillAggregation,
    TestGate,
    BiasAudit,
    Matching,
    Passport,
}

impl PipelineStage {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStage::FraudCheck => "fraud_check",
            PipelineStage::EvidenceCollection => "evidence_collection",
            PipelineStage::SkillAggregation => "skill_aggregation",
            PipelineStage::TestGate => "test_gate",
            PipelineStage::BiasAudit => "bias_audit",
            PipelineStage::Matching => "matching",
            PipelineStage::Passport => "passport",
        }
    }
}

/// High level status tracked throughout the credentialing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Processing,
    NeedsReview,
    TestRequired,
    Completed,
    Rejected,
}

impl CredentialStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CredentialStatus::Processing => "processing",
            CredentialStatus::NeedsReview => "needs_review",
            CredentialStatus::TestRequired => "test_required",
            CredentialStatus::Completed => "completed",
            CredentialStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CredentialStatus::Completed | CredentialStatus::Rejected)
    }
}

/// Severity ladder for review-worthy events. Ordering matters: `high` and
/// above pauses the pipeline, `critical` out of fraud screening rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl FlagSeverity {
    pub fn label(&self) -> &'static str {
        match self {
            FlagSeverity::Low => "low",
            FlagSeverity::Medium => "medium",
            FlagSeverity::High => "high",
            FlagSeverity::Critical => "critical",
        }
    }

    pub fn pauses_pipeline(&self) -> bool {
        *self >= FlagSeverity::High
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagStatus {
    Pending,
    Resolved,
}

/// Review-worthy event appended to the document; never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFlag {
    pub triggered_by: PipelineStage,
    pub severity: FlagSeverity,
    pub reason: String,
    pub status: FlagStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_id: Option<Uuid>,
}

impl ReviewFlag {
    pub fn new(triggered_by: PipelineStage, severity: FlagSeverity, reason: impl Into<String>) -> Self {
        Self {
            triggered_by,
            severity,
            reason: reason.into(),
            status: FlagStatus::Pending,
            review_id: None,
        }
    }
}

/// The evolving evidence/state aggregate for one candidate evaluation.
///
/// Mutated exclusively through the orchestrator one stage at a time; every
/// mutation is persisted through the store's optimistic-concurrency `save`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialDocument {
    pub application_id: ApplicationId,
    pub candidate: CandidateRef,
    pub job: JobSpec,
    pub status: CredentialStatus,
    pub current_stage: PipelineStage,
    pub stages_completed: Vec<PipelineStage>,
    pub evidence: BTreeMap<String, EvidenceRecord>,
    pub flags: Vec<ReviewFlag>,
    /// Version the document was loaded at; the store rejects stale writes.
    pub version: u64,
    /// Set when this document corrects an already-signed credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<ApplicationId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialDocument {
    pub fn new(application_id: ApplicationId, candidate: CandidateRef, job: JobSpec) -> Self {
        let now = Utc::now();
        Self {
            application_id,
            candidate,
            job,
            status: CredentialStatus::Processing,
            current_stage: PipelineStage::FraudCheck,
            stages_completed: Vec::new(),
            evidence: BTreeMap::new(),
            flags: Vec::new(),
            version: 0,
            supersedes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record (or overwrite) a stage's evidence. Re-execution on resume
    /// overwrites the previous payload rather than duplicating it.
    pub fn record_evidence(&mut self, key: impl Into<String>, record: EvidenceRecord) {
        self.evidence.insert(key.into(), record);
        self.touch();
    }

    pub fn evidence(&self, key: &str) -> Option<&EvidenceRecord> {
        self.evidence.get(key)
    }

    /// Append a stage to the completion log. Idempotent: a stage is never
    /// logged twice and the log is never reordered.
    pub fn complete_stage(&mut self, stage: PipelineStage) {
        if !self.stages_completed.contains(&stage) {
            self.stages_completed.push(stage);
        }
        self.touch();
    }

    pub fn has_completed(&self, stage: PipelineStage) -> bool {
        self.stages_completed.contains(&stage)
    }

    pub fn push_flag(&mut self, flag: ReviewFlag) {
        self.flags.push(flag);
        self.touch();
    }

    pub fn pending_flags(&self) -> impl Iterator<Item = &ReviewFlag> {
        self.flags
            .iter()
            .filter(|flag| flag.status == FlagStatus::Pending)
    }

    pub fn resolve_pending_flags(&mut self) {
        for flag in &mut self.flags {
            if flag.status == FlagStatus::Pending {
                flag.status = FlagStatus::Resolved;
            }
        }
        self.touch();
    }

    /// Aggregated skill confidence, once SKILL_AGGREGATION has run.
    pub fn skill_confidence(&self) -> Option<f64> {
        self.evidence
            .get(super::evidence::keys::SKILL)
            .and_then(EvidenceRecord::confidence)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
