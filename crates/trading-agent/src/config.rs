use analysis_core::PipelineConfig;
use anyhow::{Context, Result};
use ml_client::MLConfig;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub symbols: Vec<String>,
    pub scan_interval_seconds: u64,
    /// Directory holding one `{SYMBOL}.json` snapshot file per symbol
    pub snapshot_dir: PathBuf,
    pub pipeline_config_path: Option<PathBuf>,
    pub account_balance: f64,
    pub metrics_log_interval_cycles: u64,
    pub ml: MLConfig,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let symbols: Vec<String> = lookup("SYMBOLS")
            .unwrap_or_else(|| "AAPL,MSFT,NVDA".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            anyhow::bail!("SYMBOLS is empty");
        }

        let config = Self {
            symbols,
            scan_interval_seconds: lookup("SCAN_INTERVAL_SECONDS")
                .unwrap_or_else(|| "300".to_string())
                .parse()
                .context("SCAN_INTERVAL_SECONDS must be a whole number of seconds")?,
            snapshot_dir: PathBuf::from(
                lookup("SNAPSHOT_DIR").unwrap_or_else(|| "./snapshots".to_string()),
            ),
            pipeline_config_path: lookup("PIPELINE_CONFIG_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            account_balance: lookup("ACCOUNT_BALANCE")
                .unwrap_or_else(|| "100000.0".to_string())
                .parse()
                .context("ACCOUNT_BALANCE must be a number")?,
            metrics_log_interval_cycles: lookup("METRICS_LOG_INTERVAL_CYCLES")
                .unwrap_or_else(|| "12".to_string())
                .parse()
                .context("METRICS_LOG_INTERVAL_CYCLES must be a whole number")?,
            ml: MLConfig::from_lookup(&lookup).context("invalid ML predictor settings")?,
        };

        if config.scan_interval_seconds == 0 {
            anyhow::bail!("SCAN_INTERVAL_SECONDS must be greater than zero");
        }
        if !config.account_balance.is_finite() || config.account_balance <= 0.0 {
            anyhow::bail!("ACCOUNT_BALANCE must be positive");
        }

        Ok(config)
    }

    /// Pipeline parameters: the JSON file when one is configured, defaults
    /// otherwise, then environment overrides on top.
    pub fn pipeline_config(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<PipelineConfig> {
        let mut pipeline = match &self.pipeline_config_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read {}", path.display()))?;
                PipelineConfig::from_json_str(&raw)
                    .with_context(|| format!("invalid pipeline config in {}", path.display()))?
            }
            None => PipelineConfig::default(),
        };
        pipeline
            .apply_overrides(lookup)
            .context("invalid pipeline override")?;
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::PredictorStrategy;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.symbols, vec!["AAPL", "MSFT", "NVDA"]);
        assert_eq!(config.scan_interval_seconds, 300);
        assert_eq!(config.metrics_log_interval_cycles, 12);
        assert!(config.pipeline_config_path.is_none());
        assert!(config.ml.predictor_url.is_none());
    }

    #[test]
    fn test_symbols_are_normalised() {
        let config =
            AgentConfig::from_lookup(lookup_from(&[("SYMBOLS", " aapl, ,tsla ")])).unwrap();
        assert_eq!(config.symbols, vec!["AAPL", "TSLA"]);
    }

    #[test]
    fn test_rejects_bad_numbers() {
        let vars = [("SCAN_INTERVAL_SECONDS", "soon")];
        assert!(AgentConfig::from_lookup(lookup_from(&vars)).is_err());
        assert!(AgentConfig::from_lookup(lookup_from(&[("SCAN_INTERVAL_SECONDS", "0")])).is_err());
        assert!(AgentConfig::from_lookup(lookup_from(&[("ACCOUNT_BALANCE", "-5")])).is_err());
        assert!(AgentConfig::from_lookup(lookup_from(&[("SYMBOLS", ",")])).is_err());
    }

    #[test]
    fn test_pipeline_overrides_apply() {
        let config = AgentConfig::from_lookup(lookup_from(&[])).unwrap();
        let pipeline = config
            .pipeline_config(lookup_from(&[
                ("PREDICTOR_STRATEGY", "rule_based"),
                ("RISK_MIN_REWARD_RISK", "2.0"),
            ]))
            .unwrap();
        assert_eq!(pipeline.predictor.strategy, PredictorStrategy::RuleBased);
        assert_eq!(pipeline.risk.min_reward_risk, 2.0);
    }

    #[test]
    fn test_unsafe_override_is_rejected() {
        let config = AgentConfig::from_lookup(lookup_from(&[])).unwrap();
        let result = config.pipeline_config(lookup_from(&[("RISK_MIN_REWARD_RISK", "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_pipeline_file_is_read() {
        let dir = std::env::temp_dir().join(format!("agent-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pipeline.json");
        std::fs::write(&path, r#"{ "risk": { "min_reward_risk": 1.8 } }"#).unwrap();

        let mut config = AgentConfig::from_lookup(lookup_from(&[])).unwrap();
        config.pipeline_config_path = Some(path);
        let pipeline = config.pipeline_config(lookup_from(&[])).unwrap();
        assert_eq!(pipeline.risk.min_reward_risk, 1.8);

        std::fs::remove_dir_all(&dir).ok();
    }
}
