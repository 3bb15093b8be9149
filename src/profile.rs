use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};
use crate::parallel_config::ParallelConfig;

/// Per-stage latencies and weight footprint for one `(model, config)` pair,
/// indexed by batch size. Latency entries are per-pipeline-stage latencies
/// in seconds; `weight_mem` is per-stage weight footprint in whatever unit
/// [`ClusterEnv::mem_budget_per_device`] is denominated in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub latency: BTreeMap<usize, Vec<f64>>,
    pub weight_mem: Vec<f64>,
}

impl ProfileEntry {
    /// Worst-case per-device weight footprint: the original implementation
    /// uses `max(weight_mem)` as a single representative number rather than
    /// tracking which physical stage sits on which device.
    pub fn max_stage_mem(&self) -> f64 {
        self.weight_mem.iter().cloned().fold(0.0_f64, f64::max)
    }
}

/// `ParallelConfig -> ProfileEntry` for a single model. Absent entries mean
/// the config is infeasible for this model (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelProfile {
    pub entries: HashMap<ParallelConfig, ProfileEntry>,
}

impl ModelProfile {
    pub fn get(&self, cfg: ParallelConfig) -> Option<&ProfileEntry> {
        self.entries.get(&cfg)
    }

    pub fn insert(&mut self, cfg: ParallelConfig, entry: ProfileEntry) {
        self.entries.insert(cfg, entry);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelData {
    pub name: String,
    /// Long-run mean arrival rate, requests/sec.
    pub request_rate: f64,
    pub slo_seconds: f64,
    pub profile: ModelProfile,
}

impl ModelData {
    /// Single-device weight footprint, used as `c[i]` by the ILP planner's
    /// memory constraint. Missing `(1,1,1)` profile is coerced to twice the
    /// budget so the MIP always rejects placing this model anywhere — the
    /// model is "unplaced" rather than the solve failing (§7 MissingProfile).
    pub fn single_device_weight_mem(&self, mem_budget_per_device: f64) -> f64 {
        match self.profile.get(ParallelConfig::new(1, 1, 1)) {
            Some(entry) => entry.max_stage_mem(),
            None => mem_budget_per_device * 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEnv {
    pub num_devices: usize,
    pub num_devices_per_node: usize,
    pub mem_budget_per_device: f64,
}

impl ClusterEnv {
    pub fn validate(&self) -> Result<()> {
        if self.num_devices_per_node == 0 || self.num_devices % self.num_devices_per_node != 0 {
            return Err(PlannerError::InvariantViolation(format!(
                "num_devices ({}) must be a multiple of num_devices_per_node ({})",
                self.num_devices, self.num_devices_per_node
            )));
        }
        Ok(())
    }

    /// True if a group of `group_size` devices is allowed to straddle node
    /// boundaries under the rule in §4.G step 1.
    pub fn group_size_is_legal(&self, group_size: usize) -> bool {
        group_size <= self.num_devices_per_node || group_size % self.num_devices_per_node == 0
    }
}

/// `f(model, cfg, max_bs)` of §4.A: the SLO-adjusted maximum sustainable
/// throughput of a single replica, scaled down by `0.99^pp` to penalize deep
/// pipelines. Returns 0 when the config is not in the model's profile or
/// every batch size profiled has a degenerate (zero) max-stage latency.
pub fn capability(model: &ModelData, cfg: ParallelConfig, max_bs: usize) -> f64 {
    let Some(entry) = model.profile.get(cfg) else {
        return 0.0;
    };

    let mut max_cap = 0.0_f64;
    for (&b, latencies) in &entry.latency {
        if b > max_bs {
            continue;
        }
        let sum_lat: f64 = latencies.iter().sum();
        let max_lat = latencies.iter().cloned().fold(0.0_f64, f64::max);
        if max_lat <= 0.0 {
            continue;
        }
        let cap = ((model.slo_seconds - sum_lat) / max_lat).floor() + 1.0;
        max_cap = max_cap.max(cap);
    }

    max_cap * 0.99_f64.powi(cfg.pp as i32)
}

/// Memoizes [`capability`] on `(model index, config, max_bs)` (§9). Cheap to
/// construct per planning run; shared behind a `Mutex` so it can be used
/// from within a `rayon` fan-out without duplicating work across threads.
#[derive(Default)]
pub struct CapabilityCache {
    cache: Mutex<HashMap<(usize, ParallelConfig, usize), f64>>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(&self, model_index: usize, model: &ModelData, cfg: ParallelConfig, max_bs: usize) -> f64 {
        let key = (model_index, cfg, max_bs);
        if let Some(&v) = self.cache.lock().unwrap().get(&key) {
            return v;
        }
        let v = capability(model, cfg, max_bs);
        self.cache.lock().unwrap().insert(key, v);
        v
    }
}
