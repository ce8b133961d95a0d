use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::config::BiasSettings;
use super::evidence::{BiasAction, BiasAuditReport, BiasScope};

/// Mean confidence observed for one segment of a protected attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentStat {
    pub segment: String,
    pub mean_confidence: f64,
    pub sample_size: u32,
}

/// One scoring batch segmented along a protected attribute. The first two
/// segments define the gap: `mean(first) - mean(second)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortBatch {
    pub attribute: String,
    pub segments: Vec<SegmentStat>,
}

impl CohortBatch {
    pub fn gap(&self) -> f64 {
        match (self.segments.first(), self.segments.get(1)) {
            (Some(a), Some(b)) => a.mean_confidence - b.mean_confidence,
            _ => 0.0,
        }
    }
}

/// Supplies the current scoring batch and historical batches per protected
/// attribute. External analytics own the data; the engine only reads it.
pub trait CohortProvider: Send + Sync {
    fn current_batch(&self, attribute: &str) -> Option<CohortBatch>;
    fn history(&self, attribute: &str) -> Vec<CohortBatch>;
}

/// Map-backed provider for tests, the demo, and the dev server.
#[derive(Default, Clone)]
pub struct StaticCohortProvider {
    batches: Arc<Mutex<HashMap<String, (CohortBatch, Vec<CohortBatch>)>>>,
}

impl StaticCohortProvider {
    pub fn set(&self, current: CohortBatch, history: Vec<CohortBatch>) {
        let mut guard = self.batches.lock().expect("cohort mutex poisoned");
        guard.insert(current.attribute.clone(), (current, history));
    }
}

impl CohortProvider for StaticCohortProvider {
    fn current_batch(&self, attribute: &str) -> Option<CohortBatch> {
        let guard = self.batches.lock().expect("cohort mutex poisoned");
        guard.get(attribute).map(|(current, _)| current.clone())
    }

    fn history(&self, attribute: &str) -> Vec<CohortBatch> {
        let guard = self.batches.lock().expect("cohort mutex poisoned");
        guard
            .get(attribute)
            .map(|(_, history)| history.clone())
            .unwrap_or_default()
    }
}

/// Read-only statistical comparator over batch scores.
///
/// The audit reports on the scoring system, never on the individual: it
/// consumes cohort statistics and produces an advisory report, with no path
/// back into skill evidence or match scores.
pub struct BiasAuditEngine {
    settings: BiasSettings,
}

impl BiasAuditEngine {
    pub fn new(settings: BiasSettings) -> Self {
        Self { settings }
    }

    pub fn audit(&self, cohorts: &dyn CohortProvider) -> BiasAuditReport {
        let mut details = BTreeMap::new();
        let mut bias_detected = false;
        let mut scope = BiasScope::None;
        let mut action = BiasAction::ProceedToMatching;

        for attribute in &self.settings.attributes {
            let Some(current) = cohorts.current_batch(attribute) else {
                continue;
            };
            let gap = current.gap();
            details.insert(attribute.clone(), gap);

            if gap.abs() <= self.settings.flag_gap {
                continue;
            }
            bias_detected = true;

            // A gap is systemic only when it persists with the same sign and
            // above the flag threshold across enough historical batches.
            let persistent = cohorts
                .history(attribute)
                .iter()
                .filter(|batch| {
                    let past = batch.gap();
                    past.abs() > self.settings.flag_gap && past.signum() == gap.signum()
                })
                .count();

            if persistent >= self.settings.systemic_batches {
                scope = BiasScope::Systemic;
                if gap.abs() > self.settings.critical_gap {
                    action = BiasAction::FlagForReview;
                }
            } else if scope != BiasScope::Systemic {
                scope = BiasScope::Isolated;
            }
        }

        BiasAuditReport {
            bias_detected,
            scope,
            details,
            action,
        }
    }
}
