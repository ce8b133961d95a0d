use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use hireproof::workflows::credentialing::{
    keys, BiasScope, CandidateRef, CohortBatch, CollectorError, ContestHistory, CredentialService,
    CredentialStatus, DocumentStore, EvidenceCollector, EvidenceFragment, EvidenceRecord,
    FlagSeverity, FraudSignal, InMemoryDocumentStore, InMemoryPassportArchive, InMemoryReviewSink,
    JobRequirement, JobSpec, MatchStatus, NextAction, PipelineConfig, PipelineError, PipelineStage,
    ProfileFacts, RepositoryStats, RequirementTier, ReviewResolution, SegmentStat,
    StaticCohortProvider, StoreError,
};

struct FraudScreen {
    severity: FlagSeverity,
}

#[async_trait]
impl EvidenceCollector for FraudScreen {
    fn name(&self) -> &'static str {
        keys::FRAUD
    }

    async fn evaluate(
        &self,
        _candidate: &CandidateRef,
    ) -> Result<EvidenceFragment, CollectorError> {
        Ok(EvidenceFragment::Fraud(FraudSignal {
            severity: self.severity,
            indicators: vec!["employment dates conflict".to_string()],
            summary: "employment history could not be corroborated".to_string(),
        }))
    }
}

/// Succeeds once `calls` reaches `succeed_on`; earlier calls fail
/// transiently. `succeed_on = 1` makes it always healthy; a large value makes
/// it permanently down.
struct ContestSource {
    calls: Arc<AtomicU32>,
    succeed_on: u32,
}

#[async_trait]
impl EvidenceCollector for ContestSource {
    fn name(&self) -> &'static str {
        "leetcode"
    }

    async fn evaluate(
        &self,
        _candidate: &CandidateRef,
    ) -> Result<EvidenceFragment, CollectorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.succeed_on {
            Ok(EvidenceFragment::Contests(ContestHistory {
                rating: 2150,
                contests_attended: 28,
                percentile: 91.0,
            }))
        } else {
            Err(CollectorError::Unavailable("gateway timeout".to_string()))
        }
    }
}

struct RepositorySource {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl EvidenceCollector for RepositorySource {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn evaluate(
        &self,
        _candidate: &CandidateRef,
    ) -> Result<EvidenceFragment, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(EvidenceFragment::Repository(RepositoryStats {
            public_repos: 22,
            contributions_last_year: 450,
            stars_received: 70,
            languages: vec!["Rust".to_string(), "Go".to_string()],
        }))
    }
}

struct ProfileSource {
    calls: Arc<AtomicU32>,
    profile: ProfileFacts,
}

#[async_trait]
impl EvidenceCollector for ProfileSource {
    fn name(&self) -> &'static str {
        "profile"
    }

    async fn evaluate(
        &self,
        _candidate: &CandidateRef,
    ) -> Result<EvidenceFragment, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(EvidenceFragment::Profile(self.profile.clone()))
    }
}

fn strong_profile() -> ProfileFacts {
    ProfileFacts {
        headline: "Senior Backend Engineer".to_string(),
        years_experience: 8.0,
        declared_skills: vec![
            "Rust".to_string(),
            "PostgreSQL".to_string(),
            "Kubernetes".to_string(),
        ],
    }
}

fn thin_profile() -> ProfileFacts {
    ProfileFacts {
        headline: "Bootcamp graduate".to_string(),
        years_experience: 1.0,
        declared_skills: vec!["Rust".to_string()],
    }
}

fn candidate() -> CandidateRef {
    CandidateRef {
        candidate_id: "cand-7".to_string(),
        resume_key: Some("resumes/cand-7.pdf".to_string()),
        github_login: Some("cand7".to_string()),
        leetcode_handle: Some("cand7".to_string()),
        profile_url: None,
    }
}

fn backend_job() -> JobSpec {
    JobSpec {
        title: "Backend Engineer".to_string(),
        requirements: vec![
            JobRequirement::core("rust"),
            JobRequirement::core("postgresql"),
            JobRequirement::framework("kubernetes"),
        ],
    }
}

struct Harness {
    service: CredentialService<InMemoryDocumentStore, InMemoryReviewSink>,
    store: Arc<InMemoryDocumentStore>,
    review: Arc<InMemoryReviewSink>,
    cohorts: Arc<StaticCohortProvider>,
    collector_calls: Arc<AtomicU32>,
}

struct HarnessOptions {
    fraud_severity: FlagSeverity,
    contest_succeeds_on: u32,
    profile: ProfileFacts,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            fraud_severity: FlagSeverity::Low,
            contest_succeeds_on: 1,
            profile: strong_profile(),
        }
    }
}

fn harness(options: HarnessOptions) -> Harness {
    let mut config = PipelineConfig::default();
    config.retry.base_backoff = Duration::from_millis(1);
    config.retry.call_timeout = Duration::from_millis(200);

    let store = Arc::new(InMemoryDocumentStore::default());
    let review = Arc::new(InMemoryReviewSink::default());
    let cohorts = Arc::new(StaticCohortProvider::default());
    let collector_calls = Arc::new(AtomicU32::new(0));

    let collectors: Vec<Arc<dyn EvidenceCollector>> = vec![
        Arc::new(RepositorySource {
            calls: Arc::clone(&collector_calls),
        }),
        Arc::new(ContestSource {
            calls: Arc::clone(&collector_calls),
            succeed_on: options.contest_succeeds_on,
        }),
        Arc::new(ProfileSource {
            calls: Arc::clone(&collector_calls),
            profile: options.profile,
        }),
    ];

    let service = CredentialService::new(
        Arc::clone(&store),
        Arc::clone(&review),
        Arc::new(FraudScreen {
            severity: options.fraud_severity,
        }),
        collectors,
        Arc::clone(&cohorts) as Arc<dyn hireproof::workflows::credentialing::CohortProvider>,
        Arc::new(InMemoryPassportArchive::default()),
        config,
    );

    Harness {
        service,
        store,
        review,
        cohorts,
        collector_calls,
    }
}

fn systemic_cohorts(cohorts: &StaticCohortProvider, gap: f64) {
    let batch = |gap: f64| CohortBatch {
        attribute: "gender".to_string(),
        segments: vec![
            SegmentStat {
                segment: "a".to_string(),
                mean_confidence: 70.0 + gap,
                sample_size: 100,
            },
            SegmentStat {
                segment: "b".to_string(),
                mean_confidence: 70.0,
                sample_size: 100,
            },
        ],
    };
    cohorts.set(batch(gap), vec![batch(gap), batch(gap - 0.5), batch(gap + 0.5)]);
}

#[tokio::test]
async fn clean_candidate_walks_every_stage_in_order() {
    let harness = harness(HarnessOptions::default());

    let document = harness
        .service
        .register(candidate(), backend_job())
        .expect("registers");
    let (document, action) = harness
        .service
        .run(&document.application_id)
        .await
        .expect("runs");

    assert_eq!(action, NextAction::Done);
    assert_eq!(document.status, CredentialStatus::Completed);
    assert_eq!(
        document.stages_completed,
        vec![
            PipelineStage::FraudCheck,
            PipelineStage::EvidenceCollection,
            PipelineStage::SkillAggregation,
            PipelineStage::BiasAudit,
            PipelineStage::Matching,
            PipelineStage::Passport,
        ]
    );

    let confidence = document.skill_confidence().expect("skill evidence");
    assert!(confidence >= 70.0, "got {confidence}");

    let passport = harness
        .service
        .passport(&document.application_id)
        .expect("signed");
    assert!(harness
        .service
        .verify(&passport.public_view, &passport.signature));
    assert_eq!(passport.public_view.match_status, MatchStatus::Match);
}

#[tokio::test]
async fn transient_contest_outage_is_retried_to_success() {
    // Fails twice, succeeds on the third and final attempt.
    let harness = harness(HarnessOptions {
        contest_succeeds_on: 3,
        ..HarnessOptions::default()
    });

    let document = harness
        .service
        .register(candidate(), backend_job())
        .expect("registers");
    let (document, action) = harness
        .service
        .run(&document.application_id)
        .await
        .expect("runs");

    assert_eq!(action, NextAction::Done);
    let contest = document.evidence("leetcode").expect("record present");
    assert!(contest.available());
}

#[tokio::test]
async fn dead_collector_degrades_evidence_without_stopping_the_pipeline() {
    let harness = harness(HarnessOptions {
        contest_succeeds_on: u32::MAX,
        ..HarnessOptions::default()
    });

    let document = harness
        .service
        .register(candidate(), backend_job())
        .expect("registers");
    let (document, _) = harness
        .service
        .run(&document.application_id)
        .await
        .expect("runs");

    match document.evidence("leetcode") {
        Some(EvidenceRecord::Missing { error }) => {
            assert!(error.contains("unavailable"), "unexpected error: {error}")
        }
        other => panic!("expected degraded contest evidence, got {other:?}"),
    }
    // Degraded evidence lowers confidence but the document still progresses
    // past aggregation.
    assert!(document.has_completed(PipelineStage::SkillAggregation));
}

#[tokio::test]
async fn critical_fraud_rejects_before_any_collector_runs() {
    let harness = harness(HarnessOptions {
        fraud_severity: FlagSeverity::Critical,
        ..HarnessOptions::default()
    });

    let document = harness
        .service
        .register(candidate(), backend_job())
        .expect("registers");
    let (document, action) = harness
        .service
        .run(&document.application_id)
        .await
        .expect("runs");

    assert_eq!(action, NextAction::HaltRejected);
    assert_eq!(document.status, CredentialStatus::Rejected);
    assert_eq!(harness.collector_calls.load(Ordering::SeqCst), 0);
    assert!(matches!(
        harness.service.passport(&document.application_id),
        Err(PipelineError::NotSigned)
    ));

    // A rejected document stays rejected on further advances.
    let (document, action) = harness
        .service
        .advance(&document.application_id)
        .await
        .expect("advance is a no-op");
    assert_eq!(action, NextAction::HaltRejected);
    assert_eq!(document.status, CredentialStatus::Rejected);
}

#[tokio::test]
async fn thin_evidence_pauses_for_test_and_resumes_at_bias_audit() {
    let harness = harness(HarnessOptions {
        profile: thin_profile(),
        contest_succeeds_on: u32::MAX,
        ..HarnessOptions::default()
    });

    let document = harness
        .service
        .register(
            CandidateRef {
                github_login: None,
                leetcode_handle: None,
                ..candidate()
            },
            JobSpec {
                title: "Junior Backend Engineer".to_string(),
                requirements: vec![
                    JobRequirement::core("rust"),
                    JobRequirement::framework("docker"),
                ],
            },
        )
        .expect("registers");

    let (document, action) = harness
        .service
        .run(&document.application_id)
        .await
        .expect("runs");
    assert_eq!(action, NextAction::PauseForTest);
    assert_eq!(document.status, CredentialStatus::TestRequired);
    let collector_calls_at_pause = harness.collector_calls.load(Ordering::SeqCst);

    // Advancing a paused document is a no-op, not a re-run.
    let (_, action) = harness
        .service
        .advance(&document.application_id)
        .await
        .expect("advance");
    assert_eq!(action, NextAction::PauseForTest);

    harness
        .service
        .submit_test_result(&document.application_id, 82.0)
        .expect("first submission accepted");
    match harness
        .service
        .submit_test_result(&document.application_id, 99.0)
    {
        Err(PipelineError::TestNotPending(_)) => {}
        other => panic!("expected resubmission rejection, got {other:?}"),
    }

    let (document, action) = harness
        .service
        .run(&document.application_id)
        .await
        .expect("resumes");
    assert_eq!(action, NextAction::Done);
    assert_eq!(document.status, CredentialStatus::Completed);
    // Resume continues at the bias audit; no collector ran again.
    assert_eq!(
        harness.collector_calls.load(Ordering::SeqCst),
        collector_calls_at_pause
    );

    // The recorded test result feeds matching.
    let passport = harness
        .service
        .passport(&document.application_id)
        .expect("signed");
    assert!(passport.public_view.confidence > 9.0);
}

#[tokio::test]
async fn missing_core_skill_completes_as_conditional_match() {
    let harness = harness(HarnessOptions::default());

    let job = JobSpec {
        title: "Quant Developer".to_string(),
        requirements: vec![
            JobRequirement::core("ocaml"),
            JobRequirement {
                skill: "rust".to_string(),
                tier: RequirementTier::Framework,
                weight: 3.0,
            },
            JobRequirement {
                skill: "postgresql".to_string(),
                tier: RequirementTier::Framework,
                weight: 2.0,
            },
            JobRequirement::framework("kubernetes"),
        ],
    };
    let document = harness
        .service
        .register(candidate(), job)
        .expect("registers");
    let (document, action) = harness
        .service
        .run(&document.application_id)
        .await
        .expect("runs");

    // Never a rejection: the missing core requirement routes to a human.
    assert_eq!(action, NextAction::Done);
    assert_eq!(document.status, CredentialStatus::Completed);
    let passport = harness
        .service
        .passport(&document.application_id)
        .expect("signed");
    assert_eq!(
        passport.public_view.match_status,
        MatchStatus::ConditionalMatch
    );
    assert!(passport.public_view.decision_reason.contains("ocaml"));
}

#[tokio::test]
async fn systemic_bias_pauses_for_review_without_touching_scores() {
    let flagged = harness(HarnessOptions::default());
    systemic_cohorts(&flagged.cohorts, 14.0);
    let control = harness(HarnessOptions::default());

    let document = flagged
        .service
        .register(candidate(), backend_job())
        .expect("registers");
    let (document, action) = flagged
        .service
        .run(&document.application_id)
        .await
        .expect("runs");

    assert_eq!(action, NextAction::PauseForReview);
    assert_eq!(document.status, CredentialStatus::NeedsReview);
    let flag = document.flags.last().expect("flag raised");
    assert_eq!(flag.severity, FlagSeverity::High);
    assert_eq!(flag.triggered_by, PipelineStage::BiasAudit);

    let (ticket, _) = flagged.review.pending().pop().expect("ticket queued");
    flagged
        .review
        .resolve(&ticket, ReviewResolution::Approved)
        .expect("resolves");
    flagged
        .service
        .resume_after_review(&document.application_id)
        .expect("resumes");
    let (document, _) = flagged
        .service
        .run(&document.application_id)
        .await
        .expect("completes");

    // The audit is advisory: an identical candidate in an unflagged batch
    // gets exactly the same confidence and match score.
    let control_doc = control
        .service
        .register(candidate(), backend_job())
        .expect("registers");
    let (control_doc, _) = control
        .service
        .run(&control_doc.application_id)
        .await
        .expect("runs");

    assert_eq!(document.skill_confidence(), control_doc.skill_confidence());
    let score = |doc: &hireproof::workflows::credentialing::CredentialDocument| {
        doc.evidence(keys::MATCHING)
            .and_then(EvidenceRecord::match_score)
            .expect("match evidence")
    };
    assert_eq!(score(&document), score(&control_doc));

    // The flagged batch context still travels on the passport.
    let passport = flagged
        .service
        .passport(&document.application_id)
        .expect("signed");
    assert_eq!(passport.public_view.bias_scope, BiasScope::Systemic.label());
}

#[tokio::test]
async fn concurrent_writers_conflict_instead_of_silently_overwriting() {
    let harness = harness(HarnessOptions::default());

    let document = harness
        .service
        .register(candidate(), backend_job())
        .expect("registers");
    let stale = harness
        .store
        .load(&document.application_id)
        .expect("loads")
        .expect("present");

    // The pipeline advances (bumping the version), then the stale writer
    // tries to save what it loaded earlier.
    harness
        .service
        .advance(&document.application_id)
        .await
        .expect("advances");
    match harness.store.save(stale) {
        Err(StoreError::Conflict { .. }) => {}
        other => panic!("expected version conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn passport_is_signed_exactly_once() {
    let harness = harness(HarnessOptions::default());

    let document = harness
        .service
        .register(candidate(), backend_job())
        .expect("registers");
    let (document, _) = harness
        .service
        .run(&document.application_id)
        .await
        .expect("runs");
    let first = harness
        .service
        .passport(&document.application_id)
        .expect("signed");

    // Further advances on a completed, signed document must not mint a new
    // passport.
    let (_, action) = harness
        .service
        .advance(&document.application_id)
        .await
        .expect("advance");
    assert_eq!(action, NextAction::Done);
    let second = harness
        .service
        .passport(&document.application_id)
        .expect("still signed");

    assert_eq!(first.credential_id, second.credential_id);
    assert_eq!(first.signature, second.signature);
}

#[tokio::test]
async fn superseding_credential_reruns_the_full_pipeline() {
    let harness = harness(HarnessOptions::default());

    let original = harness
        .service
        .register(candidate(), backend_job())
        .expect("registers");
    let (original, _) = harness
        .service
        .run(&original.application_id)
        .await
        .expect("runs");
    let original_passport = harness
        .service
        .passport(&original.application_id)
        .expect("signed");

    let replacement = harness
        .service
        .supersede(&original.application_id)
        .expect("supersedes");
    assert_eq!(
        replacement.supersedes,
        Some(original.application_id.clone())
    );

    let (replacement, action) = harness
        .service
        .run(&replacement.application_id)
        .await
        .expect("runs");
    assert_eq!(action, NextAction::Done);
    let replacement_passport = harness
        .service
        .passport(&replacement.application_id)
        .expect("signed");

    // Both passports verify independently; the original stays valid.
    assert_ne!(
        original_passport.credential_id,
        replacement_passport.credential_id
    );
    assert!(harness
        .service
        .verify(&original_passport.public_view, &original_passport.signature));
    assert!(harness.service.verify(
        &replacement_passport.public_view,
        &replacement_passport.signature
    ));
}

#[tokio::test]
async fn unknown_applications_surface_not_found() {
    let harness = harness(HarnessOptions::default());
    let missing = hireproof::workflows::credentialing::ApplicationId("app-404".to_string());

    match harness.service.run(&missing).await {
        Err(PipelineError::NotFound) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}
