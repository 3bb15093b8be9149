use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};
use crate::parallel_config::ParallelConfig;
use crate::profile::{ClusterEnv, ModelData};

/// One group: a parallel config shared by all devices in the group, and the
/// set of model indices replicated onto it. `models` is a `BTreeSet` so
/// iteration order is the tie-break order used by the placement primitives
/// (lowest model index first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub config: ParallelConfig,
    pub models: BTreeSet<usize>,
}

impl Group {
    pub fn new(config: ParallelConfig) -> Self {
        Group {
            config,
            models: BTreeSet::new(),
        }
    }

    pub fn is_empty_or_null(&self) -> bool {
        self.config.is_null() || self.models.is_empty()
    }
}

/// Ordered sequence of groups. Value-typed: every mutating operation clones
/// on write via `#[derive(Clone)]`, matching §9 ("replica insertion
/// primitives clone on write").
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Placement {
    pub groups: Vec<Group>,
}

impl Placement {
    pub fn new_empty() -> Self {
        Placement { groups: Vec::new() }
    }

    pub fn from_skeleton(configs: impl IntoIterator<Item = ParallelConfig>) -> Self {
        Placement {
            groups: configs.into_iter().map(Group::new).collect(),
        }
    }

    pub fn append_group(&mut self, cfg: ParallelConfig) -> usize {
        self.groups.push(Group::new(cfg));
        self.groups.len() - 1
    }

    pub fn add_model_to_group(&mut self, group_index: usize, model_index: usize) -> Result<()> {
        let group = self.groups.get_mut(group_index).ok_or_else(|| {
            PlannerError::InvariantViolation(format!("no such group {group_index}"))
        })?;
        group.models.insert(model_index);
        Ok(())
    }

    pub fn remove_model_from_group(&mut self, group_index: usize, model_index: usize) -> Result<()> {
        let group = self.groups.get_mut(group_index).ok_or_else(|| {
            PlannerError::InvariantViolation(format!("no such group {group_index}"))
        })?;
        group.models.remove(&model_index);
        Ok(())
    }

    pub fn num_devices_used(&self) -> u64 {
        self.groups.iter().map(|g| g.config.size()).sum()
    }

    /// True only if every group has a non-null config and a non-empty model
    /// set, i.e. this is a "final" placement fit to hand back to a caller
    /// rather than an in-progress skeleton (§4.B).
    pub fn is_final(&self) -> bool {
        self.groups.iter().all(|g| !g.is_empty_or_null())
    }

    /// Per-model total capability summed across every group the model is
    /// replicated onto, used by the evaluator's fast-simulator path and by
    /// the deterministic fallback heuristic.
    pub fn total_capability_per_model(&self, model_datas: &[ModelData], max_bs: usize) -> Vec<f64> {
        let mut totals = vec![0.0_f64; model_datas.len()];
        for group in &self.groups {
            if group.config.is_null() {
                continue;
            }
            for &mi in &group.models {
                totals[mi] += crate::profile::capability(&model_datas[mi], group.config, max_bs);
            }
        }
        totals
    }

    /// Checks the structural invariants of §3/§8 that apply to *any*
    /// placement returned by a planner. `require_equality` matches the ILP
    /// planner's stricter "sum of group sizes == num_devices" obligation.
    pub fn check_invariants(&self, cluster_env: &ClusterEnv, require_equality: bool) -> Result<()> {
        let used = self.num_devices_used();
        if require_equality {
            if used != cluster_env.num_devices as u64 {
                return Err(PlannerError::InvariantViolation(format!(
                    "placement uses {used} devices, expected exactly {}",
                    cluster_env.num_devices
                )));
            }
        } else if used > cluster_env.num_devices as u64 {
            return Err(PlannerError::InvariantViolation(format!(
                "placement uses {used} devices, more than the {} available",
                cluster_env.num_devices
            )));
        }

        for group in &self.groups {
            let size = group.config.size();
            if size > 0 && !cluster_env.group_size_is_legal(size as usize) {
                return Err(PlannerError::InvariantViolation(format!(
                    "group size {size} crosses node boundary (node size {})",
                    cluster_env.num_devices_per_node
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> ClusterEnv {
        ClusterEnv {
            num_devices: 4,
            num_devices_per_node: 4,
            mem_budget_per_device: 10.0,
        }
    }

    #[test]
    fn empty_placement_round_trips_through_add_remove() {
        let mut p = Placement::new_empty();
        let gi = p.append_group(ParallelConfig::new(1, 1, 1));
        p.add_model_to_group(gi, 0).unwrap();
        assert!(p.groups[gi].models.contains(&0));
        p.remove_model_from_group(gi, 0).unwrap();
        assert!(p.groups[gi].models.is_empty());
    }

    #[test]
    fn invariant_rejects_oversubscription() {
        let mut p = Placement::new_empty();
        p.append_group(ParallelConfig::new(1, 1, 4));
        p.append_group(ParallelConfig::new(1, 1, 4));
        assert!(p.check_invariants(&env(), false).is_err());
    }

    #[test]
    fn invariant_ilp_requires_equality() {
        let mut p = Placement::new_empty();
        p.append_group(ParallelConfig::new(1, 1, 2));
        // uses 2 of 4 devices: fine for search/greedy, not for the ILP planner
        assert!(p.check_invariants(&env(), false).is_ok());
        assert!(p.check_invariants(&env(), true).is_err());
    }

    #[test]
    fn node_boundary_invariant() {
        let env = ClusterEnv {
            num_devices: 16,
            num_devices_per_node: 8,
            mem_budget_per_device: 1.0,
        };
        let mut ok = Placement::new_empty();
        ok.append_group(ParallelConfig::new(1, 1, 16));
        assert!(ok.check_invariants(&env, true).is_ok());

        let mut bad = Placement::new_empty();
        bad.append_group(ParallelConfig::new(1, 4, 3)); // size 12
        bad.append_group(ParallelConfig::new(1, 1, 4));
        assert!(bad.check_invariants(&env, false).is_err());
    }
}
