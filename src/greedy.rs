//! Uniform-greedy planner (§4.H): the fast baseline. Fixes one group size
//! for the whole cluster, fills via `fast_greedy`, and optionally refines
//! with evolutionary search.

use crate::error::{PlannerError, Result};
use crate::evaluator::PlacementEvaluator;
use crate::evolutionary::evolutionary_search;
use crate::parallel_config::ParallelConfig;
use crate::placement::Placement;
use crate::primitives::fast_greedy;
use crate::profile::{ClusterEnv, ModelData};

pub struct GreedyPlanner {
    pub group_size: usize,
    pub add_evo_search: bool,
    pub evo_generations: u32,
    pub verbose: bool,
}

impl GreedyPlanner {
    pub fn new(group_size: usize) -> Self {
        GreedyPlanner {
            group_size,
            add_evo_search: false,
            evo_generations: 200,
            verbose: false,
        }
    }

    pub fn solve(
        &self,
        model_datas: &[ModelData],
        cluster_env: &ClusterEnv,
        evaluator: &PlacementEvaluator,
    ) -> Result<Placement> {
        if self.group_size == 0 || cluster_env.num_devices % self.group_size != 0 {
            return Err(PlannerError::InvariantViolation(format!(
                "num_devices ({}) is not divisible by group_size ({})",
                cluster_env.num_devices, self.group_size
            )));
        }

        let num_groups = cluster_env.num_devices / self.group_size;
        let cfg = ParallelConfig::new(1, 1, self.group_size as u32);
        let skeleton = Placement::from_skeleton(std::iter::repeat(cfg).take(num_groups));

        let mut sol = fast_greedy(skeleton, model_datas, cluster_env, Some(evaluator), self.verbose);

        if self.add_evo_search {
            sol = evolutionary_search(vec![sol], model_datas, cluster_env, evaluator, self.evo_generations, self.verbose);
        }

        Ok(sol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::EvalMethod;
    use crate::profile::{ModelProfile, ProfileEntry};

    fn model(name: &str, rate: f64) -> ModelData {
        let mut profile = ModelProfile::default();
        profile.insert(
            ParallelConfig::new(1, 1, 1),
            ProfileEntry {
                latency: [(1usize, vec![0.1])].into_iter().collect(),
                weight_mem: vec![1.0],
            },
        );
        ModelData {
            name: name.into(),
            request_rate: rate,
            slo_seconds: 1.0,
            profile,
        }
    }

    fn env() -> ClusterEnv {
        ClusterEnv {
            num_devices: 2,
            num_devices_per_node: 2,
            mem_budget_per_device: 8.0,
        }
    }

    #[test]
    fn rejects_non_divisible_group_size() {
        let planner = GreedyPlanner::new(3);
        let models = vec![model("m0", 1.0)];
        let workload = crate::workload::gen_train_workload(&models);
        let evaluator = PlacementEvaluator::new(models.clone(), env(), workload, EvalMethod::FastSimulator, false);
        assert!(planner.solve(&models, &env(), &evaluator).is_err());
    }

    #[test]
    fn scenario_two_identical_models_two_devices() {
        // spec.md §8 scenario 2: group_size=1 gives two single-device
        // groups, one model each, with equal rates.
        let models = vec![model("m0", 1.0), model("m1", 1.0)];
        let workload = crate::workload::gen_train_workload(&models);
        let evaluator = PlacementEvaluator::new(models.clone(), env(), workload, EvalMethod::FastSimulator, false);
        let planner = GreedyPlanner::new(1);
        let sol = planner.solve(&models, &env(), &evaluator).unwrap();
        assert_eq!(sol.groups.len(), 2);
        let placed: std::collections::BTreeSet<usize> =
            sol.groups.iter().flat_map(|g| g.models.iter().copied()).collect();
        assert_eq!(placed.len(), 2);
    }
}
