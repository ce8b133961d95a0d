use super::config::MatchBands;
use super::domain::{JobSpec, RequirementTier};
use super::evidence::{
    BiasAuditReport, MatchReport, MatchStatus, SkillAssessment, TestResult, VerifiedSkill,
};

/// Deterministic scorer of verified skills against a job's requirement tiers.
///
/// Missing a framework skill only lowers the score. Missing a core skill
/// never rejects outright: it forces CONDITIONAL_MATCH with a reason naming
/// the gap, leaving the hire/no-hire call to a human.
pub struct MatchingEngine {
    bands: MatchBands,
}

impl MatchingEngine {
    pub fn new(bands: MatchBands) -> Self {
        Self { bands }
    }

    pub fn score(
        &self,
        job: &JobSpec,
        skills: &SkillAssessment,
        test: Option<&TestResult>,
        bias: &BiasAuditReport,
    ) -> MatchReport {
        let mut matched_weight = 0.0;
        let mut total_weight = 0.0;
        let mut missing_core_skills = Vec::new();

        for requirement in &job.requirements {
            total_weight += requirement.weight;
            match find_skill(&skills.verified_skills, &requirement.skill) {
                Some(skill) => matched_weight += requirement.weight * skill.strength,
                None => {
                    if requirement.tier == RequirementTier::Core {
                        missing_core_skills.push(requirement.skill.clone());
                    }
                }
            }
        }

        let coverage = if total_weight > 0.0 {
            matched_weight / total_weight
        } else {
            0.0
        };

        // A weak technical signal (failed or low test, thin evidence) drags
        // the score down instead of triggering a rejection branch.
        let technical_signal = test
            .map(|result| result.score)
            .unwrap_or(skills.confidence)
            .clamp(0.0, 100.0);
        let match_score = 100.0 * coverage * (0.5 + technical_signal / 200.0);

        let banded = self.band(match_score);
        let (match_status, decision_reason) = if missing_core_skills.is_empty() {
            (banded, format!("{} at score {match_score:.1}", banded.label()))
        } else if banded == MatchStatus::NoMatch {
            (
                MatchStatus::NoMatch,
                format!(
                    "score {match_score:.1} below conditional band; also missing core skills: {}",
                    missing_core_skills.join(", ")
                ),
            )
        } else {
            (
                MatchStatus::ConditionalMatch,
                format!(
                    "missing core skill(s) {} requires human decision despite score {match_score:.1}",
                    missing_core_skills.join(", ")
                ),
            )
        };

        MatchReport {
            match_score,
            match_status,
            decision_reason,
            missing_core_skills,
            bias_scope: bias.scope,
            bias_action: bias.action,
        }
    }

    fn band(&self, score: f64) -> MatchStatus {
        if score >= self.bands.strong_floor {
            MatchStatus::StrongMatch
        } else if score >= self.bands.match_floor {
            MatchStatus::Match
        } else if score >= self.bands.conditional_floor {
            MatchStatus::ConditionalMatch
        } else {
            MatchStatus::NoMatch
        }
    }
}

fn find_skill<'a>(skills: &'a [VerifiedSkill], name: &str) -> Option<&'a VerifiedSkill> {
    skills
        .iter()
        .find(|skill| skill.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::credentialing::domain::JobRequirement;
    use crate::workflows::credentialing::evidence::{BiasAction, BiasScope};
    use std::collections::BTreeMap;

    fn bands() -> MatchBands {
        MatchBands {
            strong_floor: 85.0,
            match_floor: 65.0,
            conditional_floor: 40.0,
        }
    }

    fn job() -> JobSpec {
        JobSpec {
            title: "Backend Engineer".to_string(),
            requirements: vec![
                JobRequirement::core("rust"),
                JobRequirement::core("postgresql"),
                JobRequirement::framework("kubernetes"),
            ],
        }
    }

    fn verified(names: &[(&str, f64)]) -> SkillAssessment {
        SkillAssessment {
            confidence: 88.0,
            test_required: false,
            verified_skills: names
                .iter()
                .map(|(name, strength)| VerifiedSkill {
                    name: name.to_string(),
                    strength: *strength,
                    sources: vec!["profile".to_string()],
                })
                .collect(),
            sources_used: vec!["profile".to_string()],
        }
    }

    fn clean_audit() -> BiasAuditReport {
        BiasAuditReport {
            bias_detected: false,
            scope: BiasScope::None,
            details: BTreeMap::new(),
            action: BiasAction::ProceedToMatching,
        }
    }

    #[test]
    fn all_requirements_met_scores_a_strong_match() {
        let engine = MatchingEngine::new(bands());
        let skills = verified(&[("rust", 1.0), ("postgresql", 1.0), ("kubernetes", 1.0)]);

        let report = engine.score(&job(), &skills, None, &clean_audit());

        assert_eq!(report.match_status, MatchStatus::StrongMatch);
        assert!(report.missing_core_skills.is_empty());
    }

    #[test]
    fn missing_core_skill_forces_conditional_match_even_at_high_score() {
        let engine = MatchingEngine::new(bands());
        // One core requirement missing among many matched frameworks, so the
        // raw score lands well inside the MATCH band before the override.
        let frameworks = [
            "go", "docker", "kafka", "redis", "grpc", "terraform", "aws", "linux", "ci",
        ];
        let mut requirements = vec![JobRequirement::core("haskell")];
        requirements.extend(frameworks.iter().map(|name| JobRequirement::framework(*name)));
        let job = JobSpec {
            title: "Platform Engineer".to_string(),
            requirements,
        };
        let matched: Vec<(&str, f64)> = frameworks.iter().map(|name| (*name, 1.0)).collect();
        let skills = verified(&matched);

        let report = engine.score(&job, &skills, None, &clean_audit());

        assert!(report.match_score >= 65.0, "got {}", report.match_score);
        assert_eq!(report.match_status, MatchStatus::ConditionalMatch);
        assert_eq!(report.missing_core_skills, vec!["haskell".to_string()]);
        assert!(report.decision_reason.contains("haskell"));
    }

    #[test]
    fn missing_framework_skill_only_lowers_the_score() {
        let engine = MatchingEngine::new(bands());
        let full = verified(&[("rust", 1.0), ("postgresql", 1.0), ("kubernetes", 1.0)]);
        let partial = verified(&[("rust", 1.0), ("postgresql", 1.0)]);

        let full_report = engine.score(&job(), &full, None, &clean_audit());
        let partial_report = engine.score(&job(), &partial, None, &clean_audit());

        assert!(partial_report.match_score < full_report.match_score);
        assert!(partial_report.missing_core_skills.is_empty());
        assert_ne!(partial_report.match_status, MatchStatus::ConditionalMatch);
    }

    #[test]
    fn low_test_score_drags_the_match_score_down() {
        let engine = MatchingEngine::new(bands());
        let skills = verified(&[("rust", 1.0), ("postgresql", 1.0), ("kubernetes", 1.0)]);
        let weak_test = TestResult {
            score: 20.0,
            passed: false,
            submitted_at: chrono::Utc::now(),
        };

        let without_test = engine.score(&job(), &skills, None, &clean_audit());
        let with_test = engine.score(&job(), &skills, Some(&weak_test), &clean_audit());

        assert!(with_test.match_score < without_test.match_score);
        // Still no rejection branch: the low signal only moves the band.
        assert_ne!(with_test.match_status, MatchStatus::NoMatch);
    }

    #[test]
    fn bias_context_is_copied_without_touching_the_score() {
        let engine = MatchingEngine::new(bands());
        let skills = verified(&[("rust", 1.0), ("postgresql", 1.0), ("kubernetes", 1.0)]);
        let mut flagged = clean_audit();
        flagged.bias_detected = true;
        flagged.scope = BiasScope::Systemic;
        flagged.action = BiasAction::FlagForReview;

        let clean = engine.score(&job(), &skills, None, &clean_audit());
        let with_bias = engine.score(&job(), &skills, None, &flagged);

        assert_eq!(clean.match_score, with_bias.match_score);
        assert_eq!(with_bias.bias_scope, BiasScope::Systemic);
        assert_eq!(with_bias.bias_action, BiasAction::FlagForReview);
    }
}
