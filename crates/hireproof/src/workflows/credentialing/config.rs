use std::env;
use std::time::Duration;

/// Policy knobs for the credentialing pipeline.
///
/// The defaults mirror the demo constants of the upstream system (70-point
/// test gate, 5-point bias gap); every value is environment-overridable so
/// production thresholds are deployment configuration, not code.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Aggregated confidence below this value pauses for a technical test.
    pub test_confidence_threshold: f64,
    /// Test scores at or above this value are marked `passed`. A failing
    /// score is still recorded and flows into matching.
    pub test_pass_score: f64,
    pub retry: RetrySettings,
    pub bias: BiasSettings,
    pub match_bands: MatchBands,
    /// Symmetric secret for the passport signer.
    pub signing_secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub call_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BiasSettings {
    /// Mean-confidence gap that marks a segment pair as biased.
    pub flag_gap: f64,
    /// Systemic gaps beyond this raise a high-severity review flag.
    pub critical_gap: f64,
    /// Historical batches a gap must persist across to count as systemic.
    pub systemic_batches: usize,
    /// Protected attributes audited for every candidate batch.
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchBands {
    pub strong_floor: f64,
    pub match_floor: f64,
    pub conditional_floor: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            test_confidence_threshold: 70.0,
            test_pass_score: 60.0,
            retry: RetrySettings {
                max_attempts: 3,
                base_backoff: Duration::from_millis(250),
                call_timeout: Duration::from_secs(30),
            },
            bias: BiasSettings {
                flag_gap: 5.0,
                critical_gap: 12.0,
                systemic_batches: 3,
                attributes: vec!["gender".to_string(), "college_tier".to_string()],
            },
            match_bands: MatchBands {
                strong_floor: 85.0,
                match_floor: 65.0,
                conditional_floor: 40.0,
            },
            signing_secret: "hireproof-dev-secret".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineConfigError {
    #[error("{var} must be a number, found '{found}'")]
    InvalidNumber { var: &'static str, found: String },
}

fn env_f64(var: &'static str, default: f64) -> Result<f64, PipelineConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<f64>()
            .map_err(|_| PipelineConfigError::InvalidNumber { var, found: raw }),
        Err(_) => Ok(default),
    }
}

fn env_u64(var: &'static str, default: u64) -> Result<u64, PipelineConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| PipelineConfigError::InvalidNumber { var, found: raw }),
        Err(_) => Ok(default),
    }
}

impl PipelineConfig {
    /// Defaults merged with `PIPELINE_*` / `PASSPORT_SIGNING_SECRET` env vars.
    pub fn from_env() -> Result<Self, PipelineConfigError> {
        let defaults = Self::default();

        let retry = RetrySettings {
            max_attempts: env_u64("PIPELINE_COLLECTOR_ATTEMPTS", defaults.retry.max_attempts as u64)?
                as u32,
            base_backoff: Duration::from_millis(env_u64(
                "PIPELINE_COLLECTOR_BACKOFF_MS",
                defaults.retry.base_backoff.as_millis() as u64,
            )?),
            call_timeout: Duration::from_secs(env_u64(
                "PIPELINE_COLLECTOR_TIMEOUT_SECS",
                defaults.retry.call_timeout.as_secs(),
            )?),
        };

        let bias = BiasSettings {
            flag_gap: env_f64("PIPELINE_BIAS_FLAG_GAP", defaults.bias.flag_gap)?,
            critical_gap: env_f64("PIPELINE_BIAS_CRITICAL_GAP", defaults.bias.critical_gap)?,
            systemic_batches: env_u64(
                "PIPELINE_BIAS_SYSTEMIC_BATCHES",
                defaults.bias.systemic_batches as u64,
            )? as usize,
            attributes: defaults.bias.attributes,
        };

        Ok(Self {
            test_confidence_threshold: env_f64(
                "PIPELINE_TEST_THRESHOLD",
                defaults.test_confidence_threshold,
            )?,
            test_pass_score: env_f64("PIPELINE_TEST_PASS_SCORE", defaults.test_pass_score)?,
            retry,
            bias,
            match_bands: defaults.match_bands,
            signing_secret: env::var("PASSPORT_SIGNING_SECRET")
                .unwrap_or(defaults.signing_secret),
        })
    }

    /// The conditional test gate. Strict: a confidence of exactly the
    /// threshold skips the test.
    pub fn requires_test(&self, confidence: f64) -> bool {
        confidence < self.test_confidence_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_boundary_is_strict() {
        let config = PipelineConfig::default();
        assert!(config.requires_test(69.9));
        assert!(!config.requires_test(70.0));
        assert!(!config.requires_test(70.1));
    }

    #[test]
    fn defaults_match_demo_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.bias.flag_gap, 5.0);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.call_timeout, Duration::from_secs(30));
    }
}
