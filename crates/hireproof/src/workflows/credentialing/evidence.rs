use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::domain::FlagSeverity;

/// Well-known evidence map keys. Collector stages use the collector's own
/// name; algorithmic stages use these constants.
pub mod keys {
    pub const FRAUD: &str = "fraud";
    pub const SKILL: &str = "skill";
    pub const TEST: &str = "test";
    pub const BIAS_AUDIT: &str = "bias_audit";
    pub const MATCHING: &str = "matching";
    pub const PASSPORT: &str = "passport";
}

/// Closed set of stage result payloads.
///
/// The orchestrator treats these as opaque beyond the handful of branching
/// fields exposed through [`EvidenceRecord`]; keeping the set closed catches
/// schema drift at compile time instead of at join points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceFragment {
    Fraud(FraudSignal),
    Repository(RepositoryStats),
    Contests(ContestHistory),
    Profile(ProfileFacts),
    Skills(SkillAssessment),
    Test(TestResult),
    BiasAudit(BiasAuditReport),
    Matching(MatchReport),
    Passport(PassportReceipt),
}

/// Result of the resume/identity fraud screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudSignal {
    pub severity: FlagSeverity,
    pub indicators: Vec<String>,
    pub summary: String,
}

/// Facts scraped from the candidate's code-hosting profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryStats {
    pub public_repos: u32,
    pub contributions_last_year: u32,
    pub stars_received: u32,
    pub languages: Vec<String>,
}

/// Competitive-programming history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContestHistory {
    pub rating: u32,
    pub contests_attended: u32,
    pub percentile: f64,
}

/// Parsed professional profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileFacts {
    pub headline: String,
    pub years_experience: f32,
    pub declared_skills: Vec<String>,
}

/// One skill after cross-source corroboration. `strength` is 0..=1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedSkill {
    pub name: String,
    pub strength: f64,
    pub sources: Vec<String>,
}

/// Output of SKILL_AGGREGATION over whatever collector evidence survived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillAssessment {
    pub confidence: f64,
    pub test_required: bool,
    pub verified_skills: Vec<VerifiedSkill>,
    pub sources_used: Vec<String>,
}

/// Externally submitted technical test result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub score: f64,
    pub passed: bool,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasScope {
    None,
    Isolated,
    Systemic,
}

impl BiasScope {
    pub fn label(&self) -> &'static str {
        match self {
            BiasScope::None => "none",
            BiasScope::Isolated => "isolated",
            BiasScope::Systemic => "systemic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasAction {
    ProceedToMatching,
    FlagForReview,
}

/// Advisory audit output. Reports on the scoring system, never on the
/// individual candidate, and never feeds back into their score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasAuditReport {
    pub bias_detected: bool,
    pub scope: BiasScope,
    /// Per protected attribute, the observed mean-confidence gap.
    pub details: BTreeMap<String, f64>,
    pub action: BiasAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    StrongMatch,
    Match,
    ConditionalMatch,
    NoMatch,
}

impl MatchStatus {
    pub fn label(&self) -> &'static str {
        match self {
            MatchStatus::StrongMatch => "STRONG_MATCH",
            MatchStatus::Match => "MATCH",
            MatchStatus::ConditionalMatch => "CONDITIONAL_MATCH",
            MatchStatus::NoMatch => "NO_MATCH",
        }
    }
}

/// Output of the matching engine, with the bias audit context copied through
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub match_score: f64,
    pub match_status: MatchStatus,
    pub decision_reason: String,
    pub missing_core_skills: Vec<String>,
    pub bias_scope: BiasScope,
    pub bias_action: BiasAction,
}

/// Receipt left on the document once the passport has been signed. Its
/// presence is the signed-exactly-once guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassportReceipt {
    pub credential_id: Uuid,
    pub content_hash: String,
    pub issued_at: DateTime<Utc>,
}

/// A stage's slot in the evidence map: either the collected payload or a
/// degraded-evidence marker recorded after retries were exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "available")]
pub enum EvidenceRecord {
    #[serde(rename = "true")]
    Collected(EvidenceFragment),
    #[serde(rename = "false")]
    Missing { error: String },
}

impl EvidenceRecord {
    pub fn available(&self) -> bool {
        matches!(self, EvidenceRecord::Collected(_))
    }

    pub fn fragment(&self) -> Option<&EvidenceFragment> {
        match self {
            EvidenceRecord::Collected(fragment) => Some(fragment),
            EvidenceRecord::Missing { .. } => None,
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match self.fragment()? {
            EvidenceFragment::Skills(assessment) => Some(assessment.confidence),
            _ => None,
        }
    }

    pub fn test_required(&self) -> Option<bool> {
        match self.fragment()? {
            EvidenceFragment::Skills(assessment) => Some(assessment.test_required),
            _ => None,
        }
    }

    pub fn severity(&self) -> Option<FlagSeverity> {
        match self.fragment()? {
            EvidenceFragment::Fraud(signal) => Some(signal.severity),
            _ => None,
        }
    }

    pub fn bias_detected(&self) -> Option<bool> {
        match self.fragment()? {
            EvidenceFragment::BiasAudit(report) => Some(report.bias_detected),
            _ => None,
        }
    }

    pub fn match_score(&self) -> Option<f64> {
        match self.fragment()? {
            EvidenceFragment::Matching(report) => Some(report.match_score),
            _ => None,
        }
    }
}
