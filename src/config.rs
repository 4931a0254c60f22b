use std::env;

const MAX_CLARIFICATION_OPTIONS: usize = 10;

/// Tunable weights for candidate reranking and the clarification gate.
#[derive(Clone, Debug, PartialEq)]
pub struct RankingConfig {
    pub fiscal_year_boost: f64,
    pub token_overlap_step: f64,
    /// Kept below `fiscal_year_boost` whenever that boost is positive.
    pub token_overlap_cap: f64,
    pub ref_code_boost: f64,
    pub ambiguity_threshold: f64,
    pub max_clarification_options: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            fiscal_year_boost: 0.05,
            token_overlap_step: 0.02,
            token_overlap_cap: 0.04,
            ref_code_boost: 0.25,
            ambiguity_threshold: 0.03,
            max_clarification_options: 3,
        }
    }
}

impl RankingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let fiscal_year_boost = env_f64("AIP_FY_BOOST").unwrap_or(defaults.fiscal_year_boost);

        Self {
            fiscal_year_boost,
            token_overlap_step: env_f64("AIP_OVERLAP_STEP").unwrap_or(defaults.token_overlap_step),
            token_overlap_cap: env_f64("AIP_OVERLAP_CAP").unwrap_or(defaults.token_overlap_cap),
            ref_code_boost: env_f64("AIP_REF_CODE_BOOST").unwrap_or(defaults.ref_code_boost),
            ambiguity_threshold: env_f64("AIP_AMBIGUITY_THRESHOLD")
                .unwrap_or(defaults.ambiguity_threshold),
            max_clarification_options: env::var("AIP_MAX_CLARIFY_OPTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_clarification_options),
        }
        .sanitized()
    }

    /// Clamps the overlap cap below the year boost, drops negative weights and
    /// bounds the option count to `1..=10`.
    pub fn sanitized(mut self) -> Self {
        self.max_clarification_options = self
            .max_clarification_options
            .clamp(1, MAX_CLARIFICATION_OPTIONS);
        self.fiscal_year_boost = self.fiscal_year_boost.max(0.0);
        self.token_overlap_step = self.token_overlap_step.max(0.0);
        self.ref_code_boost = self.ref_code_boost.max(0.0);
        self.ambiguity_threshold = self.ambiguity_threshold.max(0.0);
        self.token_overlap_cap = self.token_overlap_cap.max(0.0);
        if self.token_overlap_cap >= self.fiscal_year_boost {
            self.token_overlap_cap = self.fiscal_year_boost * 0.8;
        }
        self
    }
}

fn env_f64(key: &str) -> Option<f64> {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_overlap_below_year_boost() {
        let config = RankingConfig::default();
        assert!(config.token_overlap_cap < config.fiscal_year_boost);
        assert_eq!(config.clone().sanitized(), config);
    }

    #[test]
    fn sanitize_clamps_overlap_cap() {
        let config = RankingConfig {
            token_overlap_cap: 0.5,
            ..RankingConfig::default()
        }
        .sanitized();
        assert!(config.token_overlap_cap < config.fiscal_year_boost);
    }

    #[test]
    fn sanitize_drops_negative_weights() {
        let config = RankingConfig {
            fiscal_year_boost: -1.0,
            ambiguity_threshold: -0.2,
            ..RankingConfig::default()
        }
        .sanitized();
        assert_eq!(config.fiscal_year_boost, 0.0);
        assert_eq!(config.token_overlap_cap, 0.0);
        assert_eq!(config.ambiguity_threshold, 0.0);
    }

    #[test]
    fn sanitize_bounds_option_count() {
        let huge = RankingConfig {
            max_clarification_options: usize::MAX,
            ..RankingConfig::default()
        }
        .sanitized();
        assert_eq!(huge.max_clarification_options, 10);

        let zero = RankingConfig {
            max_clarification_options: 0,
            ..RankingConfig::default()
        }
        .sanitized();
        assert_eq!(zero.max_clarification_options, 1);
    }
}
