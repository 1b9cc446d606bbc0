//! Scaling configuration file (`autoscaling.toml`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use fleetscale_state::Market;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

pub const DEFAULT_DOWNSCALE_EXPR: &str = "1 if (tasknodes.running and tasknodes.active \
and tasknodes.count.nodes >= 2 and tasknodes.average.cpu < 0.5 and tasknodes.average.mem < 0.9) else 0";

pub const DEFAULT_UPSCALE_EXPR: &str = "3 if (tasknodes.running and tasknodes.active \
and tasknodes.count.nodes < 15 and (tasknodes.average.cpu > 0.7 or tasknodes.average.mem > 0.95)) else 0";

/// Operator-tunable scaling policy. Missing keys take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalingConfig {
    /// Seconds to sleep between ticks.
    pub loop_interval_secs: u64,
    /// Lookback window of monitoring data considered per decision.
    pub monitoring_interval_secs: u64,
    /// Evaluates to the number of nodes to remove.
    pub downscale_expr: String,
    /// Evaluates to the number of nodes to add.
    pub upscale_expr: String,
    /// Consecutive upscale signals required when `hysteresis` is on.
    pub upscale_trigger_iterations: u32,
    /// Consecutive downscale signals required when `hysteresis` is on.
    pub downscale_trigger_iterations: u32,
    /// Market to grow first, and to shed first.
    pub preferred_upscale_instance_market: Market,
    /// Cluster ids the loop may resize. Written as a comma-separated string.
    #[serde(with = "cluster_list")]
    pub autoscaling_clusters: Vec<String>,
    /// Gate scaling on the iteration thresholds instead of acting on a
    /// single evaluation.
    pub hysteresis: bool,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            loop_interval_secs: 180,
            monitoring_interval_secs: 600,
            downscale_expr: DEFAULT_DOWNSCALE_EXPR.to_string(),
            upscale_expr: DEFAULT_UPSCALE_EXPR.to_string(),
            upscale_trigger_iterations: 1,
            downscale_trigger_iterations: 1,
            preferred_upscale_instance_market: Market::Spot,
            autoscaling_clusters: Vec::new(),
            hysteresis: false,
        }
    }
}

impl ScalingConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_secs(self.loop_interval_secs)
    }

    pub fn monitoring_window(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval_secs)
    }

    /// Whether the operator enabled autoscaling for this cluster.
    pub fn is_managed(&self, cluster_id: &str) -> bool {
        self.autoscaling_clusters.iter().any(|c| c == cluster_id)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loop_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "loop_interval_secs must be greater than 0".into(),
            ));
        }
        if self.monitoring_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "monitoring_interval_secs must be greater than 0".into(),
            ));
        }
        if self.upscale_trigger_iterations == 0 || self.downscale_trigger_iterations == 0 {
            return Err(ConfigError::Invalid(
                "trigger iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// File-backed store for the scaling configuration.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the configuration file.
    pub fn load(&self) -> Result<ScalingConfig, ConfigError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;
        let config = ScalingConfig::from_toml_str(&content).map_err(|source| ConfigError::Toml {
            path: self.path.clone(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the configuration, writing the defaults first if the file does
    /// not exist yet.
    pub fn load_or_init(&self) -> Result<ScalingConfig, ConfigError> {
        if !self.path.exists() {
            let config = ScalingConfig::default();
            self.save(&config)?;
            info!(path = ?self.path, "wrote default scaling configuration");
            return Ok(config);
        }
        self.load()
    }

    pub fn save(&self, config: &ScalingConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let content = config.to_toml_string()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&self.path, content).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// `autoscaling_clusters` is a comma-separated string on disk; a TOML array
/// is accepted as well.
mod cluster_list {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ids: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ids.join(","))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Csv(String),
            List(Vec<String>),
        }

        let ids = match Raw::deserialize(deserializer)? {
            Raw::Csv(s) => s.split(',').map(str::to_string).collect(),
            Raw::List(v) => v,
        };
        Ok(ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ScalingConfig::default();
        assert_eq!(config.loop_interval(), Duration::from_secs(180));
        assert_eq!(config.monitoring_window(), Duration::from_secs(600));
        assert_eq!(config.preferred_upscale_instance_market, Market::Spot);
        assert_eq!(config.upscale_trigger_iterations, 1);
        assert!(!config.hysteresis);
        assert!(config.autoscaling_clusters.is_empty());
    }

    #[test]
    fn parse_partial_file_fills_defaults() {
        let config = ScalingConfig::from_toml_str(
            r#"
            loop_interval_secs = 60
            preferred_upscale_instance_market = "ON_DEMAND"
            autoscaling_clusters = " j-1 ,j-2,, j-3 "
            "#,
        )
        .unwrap();
        assert_eq!(config.loop_interval_secs, 60);
        assert_eq!(config.monitoring_interval_secs, 600);
        assert_eq!(config.preferred_upscale_instance_market, Market::OnDemand);
        assert_eq!(config.autoscaling_clusters, vec!["j-1", "j-2", "j-3"]);
        assert!(config.is_managed("j-2"));
        assert!(!config.is_managed("j-4"));
        assert_eq!(config.upscale_expr, DEFAULT_UPSCALE_EXPR);
    }

    #[test]
    fn cluster_list_accepts_array() {
        let config =
            ScalingConfig::from_toml_str(r#"autoscaling_clusters = ["j-1", " j-2 "]"#).unwrap();
        assert_eq!(config.autoscaling_clusters, vec!["j-1", "j-2"]);
    }

    #[test]
    fn rejects_unknown_market() {
        assert!(ScalingConfig::from_toml_str(r#"preferred_upscale_instance_market = "RESERVED""#).is_err());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let config = ScalingConfig {
            loop_interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_or_init_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("conf/autoscaling.toml"));

        let config = store.load_or_init().unwrap();
        assert_eq!(config, ScalingConfig::default());
        assert!(store.path().exists());

        // Second load reads the file back.
        assert_eq!(store.load().unwrap(), ScalingConfig::default());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("autoscaling.toml"));

        let config = ScalingConfig {
            autoscaling_clusters: vec!["j-1".into(), "j-2".into()],
            downscale_expr: "2".into(),
            ..Default::default()
        };
        store.save(&config).unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert!(content.contains("autoscaling_clusters = \"j-1,j-2\""));
        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn load_reports_path_on_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autoscaling.toml");
        std::fs::write(&path, "loop_interval_secs = \"soon\"").unwrap();

        let err = ConfigStore::new(&path).load().unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
        assert!(err.to_string().contains("autoscaling.toml"));
    }
}
