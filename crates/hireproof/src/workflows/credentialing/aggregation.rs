use std::collections::BTreeMap;

use super::evidence::{
    ContestHistory, EvidenceFragment, EvidenceRecord, ProfileFacts, RepositoryStats,
    SkillAssessment, VerifiedSkill,
};

const REPOSITORY_WEIGHT: f64 = 0.35;
const CONTEST_WEIGHT: f64 = 0.25;
const PROFILE_WEIGHT: f64 = 0.40;

/// Fuses collector evidence into one skill assessment.
///
/// Confidence is availability-weighted: each source contributes its sub-score
/// against the full weight budget, so a missing source lowers the achievable
/// confidence instead of aborting the pipeline.
pub struct SkillAggregator {
    test_confidence_threshold: f64,
}

impl SkillAggregator {
    pub fn new(test_confidence_threshold: f64) -> Self {
        Self {
            test_confidence_threshold,
        }
    }

    pub fn aggregate(&self, evidence: &BTreeMap<String, EvidenceRecord>) -> SkillAssessment {
        let mut weighted = 0.0;
        let mut sources_used = Vec::new();
        let mut repository: Option<&RepositoryStats> = None;
        let mut contests: Option<&ContestHistory> = None;
        let mut profile: Option<&ProfileFacts> = None;

        for (key, record) in evidence {
            match record.fragment() {
                Some(EvidenceFragment::Repository(stats)) => {
                    weighted += REPOSITORY_WEIGHT * repository_score(stats);
                    repository = Some(stats);
                    sources_used.push(key.clone());
                }
                Some(EvidenceFragment::Contests(history)) => {
                    weighted += CONTEST_WEIGHT * contest_score(history);
                    contests = Some(history);
                    sources_used.push(key.clone());
                }
                Some(EvidenceFragment::Profile(facts)) => {
                    weighted += PROFILE_WEIGHT * profile_score(facts);
                    profile = Some(facts);
                    sources_used.push(key.clone());
                }
                _ => {}
            }
        }

        let confidence = weighted / (REPOSITORY_WEIGHT + CONTEST_WEIGHT + PROFILE_WEIGHT);
        let verified_skills = corroborate_skills(profile, repository, contests);

        SkillAssessment {
            confidence,
            test_required: confidence < self.test_confidence_threshold,
            verified_skills,
            sources_used,
        }
    }
}

fn repository_score(stats: &RepositoryStats) -> f64 {
    let activity = f64::from(stats.public_repos) * 4.0
        + f64::from(stats.contributions_last_year) / 5.0
        + f64::from(stats.stars_received);
    activity.min(100.0)
}

fn contest_score(history: &ContestHistory) -> f64 {
    history.percentile.clamp(0.0, 100.0)
}

fn profile_score(facts: &ProfileFacts) -> f64 {
    (f64::from(facts.years_experience) * 8.0 + facts.declared_skills.len() as f64 * 6.0).min(100.0)
}

/// Declared skills start at half strength and gain strength for each
/// independent source that corroborates them. Repository languages the
/// candidate never declared still count, at reduced strength.
fn corroborate_skills(
    profile: Option<&ProfileFacts>,
    repository: Option<&RepositoryStats>,
    contests: Option<&ContestHistory>,
) -> Vec<VerifiedSkill> {
    let mut skills: Vec<VerifiedSkill> = Vec::new();
    let repo_languages: Vec<String> = repository
        .map(|stats| stats.languages.iter().map(|l| l.to_lowercase()).collect())
        .unwrap_or_default();
    let strong_contest_record = contests.is_some_and(|history| history.percentile >= 75.0);

    if let Some(facts) = profile {
        for declared in &facts.declared_skills {
            let mut strength: f64 = 0.5;
            let mut sources = vec!["profile".to_string()];
            if repo_languages.contains(&declared.to_lowercase()) {
                strength += 0.3;
                sources.push("repository".to_string());
            }
            if strong_contest_record {
                strength += 0.2;
                sources.push("contests".to_string());
            }
            skills.push(VerifiedSkill {
                name: declared.to_lowercase(),
                strength: strength.min(1.0),
                sources,
            });
        }
    }

    for language in &repo_languages {
        if !skills.iter().any(|skill| &skill.name == language) {
            skills.push(VerifiedSkill {
                name: language.clone(),
                strength: 0.4,
                sources: vec!["repository".to_string()],
            });
        }
    }

    skills
}
