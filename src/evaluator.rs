use std::sync::Arc;

use rayon::prelude::*;

use crate::placement::Placement;
use crate::profile::{ClusterEnv, ModelData};
use crate::workload::Workload;

/// One placement scored against one workload, handed to an external
/// discrete-event simulator (§6 "Simulator contract"). The real simulator
/// is an external collaborator (§1); this crate only defines the boundary.
#[derive(Debug, Clone)]
pub struct SimulationCase {
    pub placement: Placement,
    pub model_datas: Arc<Vec<ModelData>>,
    pub cluster_env: ClusterEnv,
    pub workload: Arc<Workload>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationMetrics {
    /// Fraction of requests meeting their SLO, in `[0, 1]`.
    pub goodput: f64,
}

/// External discrete-event simulator contract (§6). Implementations are
/// pure functions of their input case and must not share mutable state
/// across calls (§5).
pub trait Simulator: Send + Sync {
    fn simulate_one_case(&self, case: &SimulationCase) -> SimulationMetrics;
}

/// `method` of §4.D. `FullSimulator` carries the injected external
/// simulator so the crate is fully testable without one.
#[derive(Clone)]
pub enum EvalMethod {
    FastSimulator,
    FullSimulator(Arc<dyn Simulator>),
}

/// Scores batches of placements against a fixed workload (§4.D). Construct
/// once per planning run; read-only afterwards.
pub struct PlacementEvaluator {
    model_datas: Arc<Vec<ModelData>>,
    cluster_env: ClusterEnv,
    workload: Arc<Workload>,
    method: EvalMethod,
    parallel: bool,
    max_bs: usize,
}

impl PlacementEvaluator {
    pub fn new(
        model_datas: Vec<ModelData>,
        cluster_env: ClusterEnv,
        workload: Workload,
        method: EvalMethod,
        parallel: bool,
    ) -> Self {
        PlacementEvaluator {
            model_datas: Arc::new(model_datas),
            cluster_env,
            workload: Arc::new(workload),
            method,
            parallel,
            max_bs: 1,
        }
    }

    pub fn model_datas(&self) -> &[ModelData] {
        &self.model_datas
    }

    pub fn cluster_env(&self) -> ClusterEnv {
        self.cluster_env
    }

    /// Scores a batch of placements. Order-preserving and deterministic
    /// regardless of `parallel` (§4.D, §5, §8).
    pub fn get_scores(&self, placements: &[Placement]) -> Vec<f64> {
        if self.parallel {
            let mut scored: Vec<(usize, f64)> = placements
                .par_iter()
                .enumerate()
                .map(|(i, p)| (i, self.score_one(p)))
                .collect();
            scored.sort_by_key(|(i, _)| *i);
            scored.into_iter().map(|(_, s)| s).collect()
        } else {
            placements.iter().map(|p| self.score_one(p)).collect()
        }
    }

    fn score_one(&self, placement: &Placement) -> f64 {
        match &self.method {
            EvalMethod::FastSimulator => self.fast_simulator_score(placement),
            EvalMethod::FullSimulator(sim) => {
                let case = SimulationCase {
                    placement: placement.clone(),
                    model_datas: self.model_datas.clone(),
                    cluster_env: self.cluster_env,
                    workload: self.workload.clone(),
                };
                sim.simulate_one_case(&case).goodput
            }
        }
    }

    /// Closed-form queueing approximation: per-model goodput is the
    /// capability-to-rate ratio clamped to 1, and the overall score is the
    /// arrival-rate-weighted average goodput across models (§4.D).
    fn fast_simulator_score(&self, placement: &Placement) -> f64 {
        let caps = placement.total_capability_per_model(&self.model_datas, self.max_bs);
        let mut weighted = 0.0;
        let mut total_rate = 0.0;
        for (model, &cap) in self.model_datas.iter().zip(caps.iter()) {
            if model.request_rate <= 0.0 {
                continue;
            }
            let goodput = (cap / model.request_rate).min(1.0).max(0.0);
            weighted += model.request_rate * goodput;
            total_rate += model.request_rate;
        }
        if total_rate <= 0.0 {
            1.0
        } else {
            weighted / total_rate
        }
    }
}

/// Test double for [`Simulator`]: always reports the fast-simulator score,
/// so tests can exercise the `FullSimulator` code path without a real
/// discrete-event engine.
#[cfg(test)]
pub struct NullSimulator;

#[cfg(test)]
impl Simulator for NullSimulator {
    fn simulate_one_case(&self, case: &SimulationCase) -> SimulationMetrics {
        let caps = case
            .placement
            .total_capability_per_model(&case.model_datas, 1);
        let mut weighted = 0.0;
        let mut total_rate = 0.0;
        for (model, &cap) in case.model_datas.iter().zip(caps.iter()) {
            if model.request_rate <= 0.0 {
                continue;
            }
            weighted += model.request_rate * (cap / model.request_rate).min(1.0).max(0.0);
            total_rate += model.request_rate;
        }
        SimulationMetrics {
            goodput: if total_rate <= 0.0 { 1.0 } else { weighted / total_rate },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel_config::ParallelConfig;
    use crate::profile::{ModelProfile, ProfileEntry};

    fn single_model(rate: f64, slo: f64, cfg: ParallelConfig, latency: f64) -> ModelData {
        let mut profile = ModelProfile::default();
        profile.insert(
            cfg,
            ProfileEntry {
                latency: [(1usize, vec![latency])].into_iter().collect(),
                weight_mem: vec![1.0],
            },
        );
        ModelData {
            name: "m0".into(),
            request_rate: rate,
            slo_seconds: slo,
            profile,
        }
    }

    fn env() -> ClusterEnv {
        ClusterEnv {
            num_devices: 1,
            num_devices_per_node: 1,
            mem_budget_per_device: 10.0,
        }
    }

    #[test]
    fn order_is_preserved_and_deterministic() {
        let cfg = ParallelConfig::new(1, 1, 1);
        let models = vec![single_model(2.0, 1.0, cfg, 0.5)];
        let workload = crate::workload::gen_train_workload(&models);
        let eval = PlacementEvaluator::new(models, env(), workload, EvalMethod::FastSimulator, true);

        let mut a = Placement::new_empty();
        let gi = a.append_group(cfg);
        a.add_model_to_group(gi, 0).unwrap();
        let b = Placement::new_empty();
        let c = a.clone();

        let placements = vec![a.clone(), b.clone(), c.clone()];
        let scores1 = eval.get_scores(&placements);
        let scores2 = eval.get_scores(&placements);
        assert_eq!(scores1, scores2);
        assert_eq!(scores1[0], scores1[2]);
    }

    #[test]
    fn full_simulator_path_matches_fast_on_null_simulator() {
        let cfg = ParallelConfig::new(1, 1, 1);
        let models = vec![single_model(2.0, 1.0, cfg, 0.5)];
        let workload = crate::workload::gen_train_workload(&models);
        let eval_fast =
            PlacementEvaluator::new(models.clone(), env(), workload.clone(), EvalMethod::FastSimulator, false);
        let eval_full = PlacementEvaluator::new(
            models,
            env(),
            workload,
            EvalMethod::FullSimulator(Arc::new(NullSimulator)),
            false,
        );

        let mut p = Placement::new_empty();
        let gi = p.append_group(cfg);
        p.add_model_to_group(gi, 0).unwrap();

        assert_eq!(eval_fast.get_scores(&[p.clone()]), eval_full.get_scores(&[p]));
    }
}
