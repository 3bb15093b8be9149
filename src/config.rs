//! Planner configuration: the cluster description and solver knobs, loaded
//! from a TOML file and overridable from the CLI (`src/main.rs`). Separate
//! from `ModelData`, which is loaded from its own (larger) profile file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::profile::ClusterEnv;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    Ilp,
    Search,
    Greedy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlannerConfig {
    pub cluster_env: ClusterEnv,
    pub policy: PolicyKind,

    #[serde(default = "default_ilp_time_limit_secs")]
    pub ilp_time_limit_secs: u64,

    #[serde(default)]
    pub add_evo_search: bool,

    #[serde(default = "default_evo_generations")]
    pub evo_generations: u32,

    #[serde(default = "default_greedy_group_size")]
    pub greedy_group_size: usize,

    #[serde(default)]
    pub parallel_evaluator: bool,
}

fn default_ilp_time_limit_secs() -> u64 {
    30
}

fn default_evo_generations() -> u32 {
    200
}

fn default_greedy_group_size() -> usize {
    1
}

impl PlannerConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let cfg: PlannerConfig = toml::from_str(text)?;
        cfg.cluster_env.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_config() {
        let toml = r#"
            policy = "greedy"

            [cluster-env]
            num-devices = 4
            num-devices-per-node = 4
            mem-budget-per-device = 16.0
        "#;
        let cfg = PlannerConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.policy, PolicyKind::Greedy);
        assert_eq!(cfg.ilp_time_limit_secs, 30);
        assert_eq!(cfg.cluster_env.num_devices, 4);
    }

    #[test]
    fn rejects_invalid_cluster_env() {
        let toml = r#"
            policy = "ilp"

            [cluster-env]
            num-devices = 10
            num-devices-per-node = 8
            mem-budget-per-device = 16.0
        "#;
        assert!(PlannerConfig::from_toml_str(toml).is_err());
    }
}
