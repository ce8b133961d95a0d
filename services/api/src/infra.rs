use async_trait::async_trait;
use hireproof::workflows::credentialing::{
    CandidateRef, CollectorError, ContestHistory, CostTier, CredentialService, EvidenceCollector,
    EvidenceFragment, FlagSeverity, FraudSignal, InMemoryDocumentStore, InMemoryPassportArchive,
    InMemoryReviewSink, PipelineConfig, ProfileFacts, RepositoryStats, StaticCohortProvider,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type InMemoryCredentialService =
    CredentialService<InMemoryDocumentStore, InMemoryReviewSink>;

/// Everything the API needs to drive the pipeline, with the in-memory
/// backends exposed so the demo and tests can script reviewer decisions.
pub(crate) struct Pipeline {
    pub(crate) service: Arc<InMemoryCredentialService>,
    pub(crate) review: Arc<InMemoryReviewSink>,
    pub(crate) cohorts: Arc<StaticCohortProvider>,
}

/// Scripted data sources standing in for the real collector integrations.
/// Candidates are keyed by the handle each collector resolves.
#[derive(Default)]
pub(crate) struct ScriptedSources {
    pub(crate) fraud: HashMap<String, FraudSignal>,
    pub(crate) repositories: HashMap<String, RepositoryStats>,
    pub(crate) contests: HashMap<String, ContestHistory>,
    pub(crate) profiles: HashMap<String, ProfileFacts>,
}

pub(crate) fn build_pipeline(
    config: PipelineConfig,
    sources: ScriptedSources,
    flaky_contest_failures: Option<u32>,
) -> Pipeline {
    let review = Arc::new(InMemoryReviewSink::default());
    let cohorts = Arc::new(StaticCohortProvider::default());

    let fraud: Arc<dyn EvidenceCollector> = Arc::new(ScriptedFraudScreen {
        flagged: sources.fraud,
    });
    let mut contest: Arc<dyn EvidenceCollector> = Arc::new(ScriptedContestCollector {
        tier: CostTier::Local,
        contests: sources.contests,
    });
    if let Some(failures) = flaky_contest_failures {
        contest = Arc::new(FlakyCollector {
            inner: contest,
            failures: AtomicU32::new(failures),
        });
    }
    let collectors: Vec<Arc<dyn EvidenceCollector>> = vec![
        Arc::new(ScriptedRepositoryCollector {
            tier: CostTier::Local,
            repositories: sources.repositories,
        }),
        contest,
        Arc::new(ScriptedProfileCollector {
            tier: CostTier::Cloud,
            profiles: sources.profiles,
        }),
    ];

    let service = Arc::new(CredentialService::new(
        Arc::new(InMemoryDocumentStore::default()),
        Arc::clone(&review),
        fraud,
        collectors,
        Arc::clone(&cohorts) as Arc<dyn hireproof::workflows::credentialing::CohortProvider>,
        Arc::new(InMemoryPassportArchive::default()),
        config,
    ));

    Pipeline {
        service,
        review,
        cohorts,
    }
}

/// Screens every candidate; unknown candidates pass with a low-severity
/// all-clear signal.
pub(crate) struct ScriptedFraudScreen {
    pub(crate) flagged: HashMap<String, FraudSignal>,
}

#[async_trait]
impl EvidenceCollector for ScriptedFraudScreen {
    fn name(&self) -> &'static str {
        "fraud"
    }

    async fn evaluate(
        &self,
        candidate: &CandidateRef,
    ) -> Result<EvidenceFragment, CollectorError> {
        let signal = self
            .flagged
            .get(&candidate.candidate_id)
            .cloned()
            .unwrap_or_else(|| FraudSignal {
                severity: FlagSeverity::Low,
                indicators: Vec::new(),
                summary: "no fraud indicators found".to_string(),
            });
        Ok(EvidenceFragment::Fraud(signal))
    }
}

pub(crate) struct ScriptedRepositoryCollector {
    #[allow(dead_code)]
    pub(crate) tier: CostTier,
    pub(crate) repositories: HashMap<String, RepositoryStats>,
}

#[async_trait]
impl EvidenceCollector for ScriptedRepositoryCollector {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn evaluate(
        &self,
        candidate: &CandidateRef,
    ) -> Result<EvidenceFragment, CollectorError> {
        let login = candidate
            .github_login
            .as_deref()
            .ok_or_else(|| CollectorError::Invalid("no code-hosting login on file".to_string()))?;
        self.repositories
            .get(login)
            .cloned()
            .map(EvidenceFragment::Repository)
            .ok_or_else(|| CollectorError::Unavailable(format!("profile '{login}' unreachable")))
    }
}

pub(crate) struct ScriptedContestCollector {
    #[allow(dead_code)]
    pub(crate) tier: CostTier,
    pub(crate) contests: HashMap<String, ContestHistory>,
}

#[async_trait]
impl EvidenceCollector for ScriptedContestCollector {
    fn name(&self) -> &'static str {
        "leetcode"
    }

    async fn evaluate(
        &self,
        candidate: &CandidateRef,
    ) -> Result<EvidenceFragment, CollectorError> {
        let handle = candidate
            .leetcode_handle
            .as_deref()
            .ok_or_else(|| CollectorError::Invalid("no contest handle on file".to_string()))?;
        self.contests
            .get(handle)
            .cloned()
            .map(EvidenceFragment::Contests)
            .ok_or_else(|| CollectorError::Unavailable(format!("handle '{handle}' unreachable")))
    }
}

pub(crate) struct ScriptedProfileCollector {
    #[allow(dead_code)]
    pub(crate) tier: CostTier,
    pub(crate) profiles: HashMap<String, ProfileFacts>,
}

#[async_trait]
impl EvidenceCollector for ScriptedProfileCollector {
    fn name(&self) -> &'static str {
        "profile"
    }

    async fn evaluate(
        &self,
        candidate: &CandidateRef,
    ) -> Result<EvidenceFragment, CollectorError> {
        self.profiles
            .get(&candidate.candidate_id)
            .cloned()
            .map(EvidenceFragment::Profile)
            .ok_or_else(|| {
                CollectorError::Unavailable("profile parser backlog, try again".to_string())
            })
    }
}

/// Wraps a collector and fails the first `failures` calls, exercising the
/// retry-then-degrade path end to end.
pub(crate) struct FlakyCollector {
    pub(crate) inner: Arc<dyn EvidenceCollector>,
    pub(crate) failures: AtomicU32,
}

#[async_trait]
impl EvidenceCollector for FlakyCollector {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn evaluate(
        &self,
        candidate: &CandidateRef,
    ) -> Result<EvidenceFragment, CollectorError> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok()
        {
            return Err(CollectorError::Unavailable(
                "connection reset by peer".to_string(),
            ));
        }
        self.inner.evaluate(candidate).await
    }
}

/// Scripted demo/server fixtures: three candidates exercising the clean,
/// test-gated, and fraud-rejected paths.
pub(crate) fn demo_sources() -> ScriptedSources {
    let mut sources = ScriptedSources::default();

    sources.repositories.insert(
        "priya-s".to_string(),
        RepositoryStats {
            public_repos: 24,
            contributions_last_year: 520,
            stars_received: 85,
            languages: vec!["Rust".to_string(), "Go".to_string()],
        },
    );
    sources.contests.insert(
        "priya_codes".to_string(),
        ContestHistory {
            rating: 2250,
            contests_attended: 41,
            percentile: 94.0,
        },
    );
    sources.profiles.insert(
        "cand-priya".to_string(),
        ProfileFacts {
            headline: "Senior Backend Engineer".to_string(),
            years_experience: 9.0,
            declared_skills: vec![
                "Rust".to_string(),
                "PostgreSQL".to_string(),
                "Kubernetes".to_string(),
            ],
        },
    );

    // Thin evidence: profile only, so aggregation lands under the test gate.
    sources.profiles.insert(
        "cand-rahul".to_string(),
        ProfileFacts {
            headline: "Self-taught developer".to_string(),
            years_experience: 1.5,
            declared_skills: vec!["Rust".to_string(), "Docker".to_string()],
        },
    );

    sources.fraud.insert(
        "cand-shadow".to_string(),
        FraudSignal {
            severity: FlagSeverity::Critical,
            indicators: vec![
                "employment dates conflict with public records".to_string(),
                "resume duplicated from another applicant".to_string(),
            ],
            summary: "fabricated employment history".to_string(),
        },
    );
    sources.profiles.insert(
        "cand-shadow".to_string(),
        ProfileFacts {
            headline: "Principal Engineer".to_string(),
            years_experience: 15.0,
            declared_skills: vec!["Rust".to_string()],
        },
    );

    sources
}
