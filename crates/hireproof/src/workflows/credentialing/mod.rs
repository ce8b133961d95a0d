//! Candidate credentialing pipeline.
//!
//! One submission flows through fraud screening, concurrent evidence
//! collection, skill aggregation, an optional technical test gate, a
//! read-only bias audit, and job matching, and finishes as a signed,
//! verifiable credential passport. Stage execution is owned by the
//! orchestrator; pausing and resuming (tests, human review) is owned by the
//! service facade.

pub mod aggregation;
pub mod bias;
pub mod collectors;
pub mod config;
pub mod domain;
pub mod evidence;
pub mod matching;
pub mod orchestrator;
pub mod review;
pub mod router;
pub mod service;
pub mod signer;
pub mod store;

pub use aggregation::SkillAggregator;
pub use bias::{BiasAuditEngine, CohortBatch, CohortProvider, SegmentStat, StaticCohortProvider};
pub use collectors::{collect_with_retry, CollectorError, CostTier, EvidenceCollector};
pub use config::{BiasSettings, MatchBands, PipelineConfig, PipelineConfigError, RetrySettings};
pub use domain::{
    ApplicationId, CandidateRef, CredentialDocument, CredentialStatus, FlagSeverity, FlagStatus,
    JobRequirement, JobSpec, PipelineStage, RequirementTier, ReviewFlag,
};
pub use evidence::{
    keys, BiasAction, BiasAuditReport, BiasScope, ContestHistory, EvidenceFragment,
    EvidenceRecord, FraudSignal, MatchReport, MatchStatus, PassportReceipt, ProfileFacts,
    RepositoryStats, SkillAssessment, TestResult, VerifiedSkill,
};
pub use matching::MatchingEngine;
pub use orchestrator::{NextAction, Orchestrator, PipelineError};
pub use review::{InMemoryReviewSink, ReviewError, ReviewId, ReviewResolution, ReviewSink};
pub use router::credential_routes;
pub use service::{CredentialService, CredentialStatusView};
pub use signer::{
    InMemoryPassportArchive, PassportArchive, PassportArchiveError, PassportSigner, PassportView,
    SignedPassport, SigningError,
};
pub use store::{DocumentStore, InMemoryDocumentStore, StoreError};
