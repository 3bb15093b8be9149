//! ILP planner (§4.F): formulates selective replication + per-slot group
//! configuration as a mixed integer program and decodes the solution into a
//! `Placement`.
//!
//! -----------------------------------------------------------------------
//! Variables (all binary unless noted)
//! -----------------------------------------------------------------------
//!
//!     p[i][j]   model i assigned to slot j,             i in 0..N, j in 0..M
//!     s[j][k]   slot j runs group-config k,              k in 0..K
//!     pxs[i][j][k]  linearization of p[i][j] AND s[j][k]
//!     min_tol, sum_tol >= 0 (continuous)
//!
//! N = number of models, M = cluster_env.num_devices. `j` ranges over M
//! *slots*, not physical devices: a slot running a size-`g[k]` config stands
//! in for a whole group of `g[k]` devices, and M is just a safe upper bound
//! on how many non-null slots a placement could need (the all-singleton
//! case). The decoding step below turns each non-null slot into its own
//! logical group — see the module-level note on why physical device
//! identity is not tracked (§4.F "Decoding", §9).
//!
//!     maximize   min_tol + eps * sum_tol
//!     subject to
//!       (a) memory:        sum_i p[i][j] * c[i]/C  <=  sum_k s[j][k] * g[k]      for all j
//!       (b) capability:    cap[i] = sum_{j,k} pxs[i][j][k] * f[i][k]
//!       (c) min tolerance: min_tol <= cap[i] / a[i]                              for all i
//!           sum tolerance: sum_tol == sum_i cap[i] / a[i]
//!       (d) total devices: sum_{j,k} s[j][k] * g[k] == M
//!       (e) exclusivity:   sum_k s[j][k] == 1                                    for all j
//!       (f) linearization: pxs[i][j][k] <= p[i][j]
//!                          pxs[i][j][k] <= s[j][k]
//!                          pxs[i][j][k] >= p[i][j] + s[j][k] - 1
//! -----------------------------------------------------------------------

use good_lp::{constraint, variable, Expression, ProblemVariables, Solution, SolverModel, Variable};

use crate::error::{PlannerError, Result};
use crate::parallel_config::ParallelConfig;
use crate::placement::{Group, Placement};
use crate::profile::{capability, ClusterEnv, ModelData};

const EPS: f64 = 1e-4;

/// Fixed small enumeration of group configs the ILP chooses from (including
/// the null config at index 0), matching the original implementation's
/// hard-coded table rather than a free choice of `(dp, op, pp)`.
pub fn default_group_configs() -> Vec<ParallelConfig> {
    vec![
        ParallelConfig::NULL,
        ParallelConfig::new(1, 1, 1),
        ParallelConfig::new(1, 1, 2),
        ParallelConfig::new(1, 1, 4),
        ParallelConfig::new(1, 1, 8),
    ]
}

pub struct IlpPlanner {
    pub time_limit_secs: u64,
    pub threads: usize,
    pub max_bs: usize,
    pub group_configs: Vec<ParallelConfig>,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct IlpReport {
    pub objective: f64,
}

impl IlpPlanner {
    /// Probes for the `coin_cbc` binary the way the original checks
    /// `pulp.listSolvers(onlyAvailable=True)` at construction time, so a
    /// missing backend fails fast instead of mid-solve (§7 SolverUnavailable).
    pub fn new() -> Result<Self> {
        which_cbc()?;
        Ok(IlpPlanner {
            time_limit_secs: 30,
            threads: num_cpus::get(),
            max_bs: 1,
            group_configs: default_group_configs(),
        })
    }

    pub fn with_time_limit(mut self, secs: u64) -> Self {
        self.time_limit_secs = secs;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn solve(&self, model_datas: &[ModelData], cluster_env: &ClusterEnv) -> Result<(Placement, IlpReport)> {
        cluster_env.validate()?;

        let n = model_datas.len();
        let m = cluster_env.num_devices;
        let k = self.group_configs.len();
        let c_budget = cluster_env.mem_budget_per_device;

        let group_sizes: Vec<f64> = self.group_configs.iter().map(|cfg| cfg.size() as f64).collect();
        let rates: Vec<f64> = model_datas.iter().map(|m| m.request_rate).collect();
        let single_device_mem: Vec<f64> = model_datas
            .iter()
            .map(|m| m.single_device_weight_mem(c_budget))
            .collect();

        let mut cap_table = vec![vec![0.0_f64; k]; n];
        for i in 0..n {
            for kk in 0..k {
                cap_table[i][kk] = capability(&model_datas[i], self.group_configs[kk], self.max_bs);
            }
        }

        let mut vars = ProblemVariables::new();
        let p: Vec<Vec<Variable>> = (0..n)
            .map(|_| (0..m).map(|_| vars.add(variable().binary())).collect())
            .collect();
        let s: Vec<Vec<Variable>> = (0..m)
            .map(|_| (0..k).map(|_| vars.add(variable().binary())).collect())
            .collect();
        let pxs: Vec<Vec<Vec<Variable>>> = (0..n)
            .map(|_| (0..m).map(|_| (0..k).map(|_| vars.add(variable().binary())).collect()).collect())
            .collect();
        let min_tol = vars.add(variable().min(0.0));
        let sum_tol = vars.add(variable().min(0.0));

        let objective: Expression = min_tol + EPS * sum_tol;

        let mut model = vars.maximise(objective).using(good_lp::solvers::coin_cbc::coin_cbc);
        model.set_parameter("sec", &self.time_limit_secs.to_string());
        model.set_parameter("threads", &self.threads.to_string());

        // (a) memory budget on each slot
        for j in 0..m {
            let lhs: Expression = (0..n).map(|i| p[i][j] * (single_device_mem[i] / c_budget)).sum();
            let rhs: Expression = (0..k).map(|kk| s[j][kk] * group_sizes[kk]).sum();
            model = model.with(constraint!(lhs <= rhs));
        }

        // (b)/(c) capability aggregation + tolerance bounds
        let mut cap_exprs: Vec<Expression> = Vec::with_capacity(n);
        for i in 0..n {
            let cap: Expression = (0..m)
                .flat_map(|j| (0..k).map(move |kk| (j, kk)))
                .map(|(j, kk)| pxs[i][j][kk] * cap_table[i][kk])
                .sum();
            cap_exprs.push(cap);
        }
        for i in 0..n {
            if rates[i] <= 0.0 {
                continue; // zero-rate model: min_tol term is +inf, skip (§8 boundary case)
            }
            model = model.with(constraint!(min_tol * rates[i] <= cap_exprs[i].clone()));
        }
        let sum_expr: Expression = (0..n)
            .filter(|&i| rates[i] > 0.0)
            .map(|i| cap_exprs[i].clone() * (1.0 / rates[i]))
            .sum();
        model = model.with(constraint!(sum_tol == sum_expr));

        // (d) total devices used equals M exactly
        let total_devices: Expression = (0..m)
            .flat_map(|j| (0..k).map(move |kk| (j, kk)))
            .map(|(j, kk)| s[j][kk] * group_sizes[kk])
            .sum();
        model = model.with(constraint!(total_devices == m as f64));

        // (e) exactly one config per slot
        for j in 0..m {
            let one: Expression = (0..k).map(|kk| s[j][kk] * 1.0).sum();
            model = model.with(constraint!(one == 1.0));
        }

        // (f) linearization of pxs[i][j][k] = p[i][j] AND s[j][k]
        for i in 0..n {
            for j in 0..m {
                for kk in 0..k {
                    model = model.with(constraint!(pxs[i][j][kk] <= p[i][j]));
                    model = model.with(constraint!(pxs[i][j][kk] <= s[j][kk]));
                    model = model.with(constraint!(pxs[i][j][kk] >= p[i][j] + s[j][kk] - 1.0));
                }
            }
        }

        let solution = model.solve().map_err(|e| match e {
            good_lp::ResolutionError::Infeasible => PlannerError::InfeasibleBudget {
                mem_budget_per_device: c_budget,
            },
            good_lp::ResolutionError::Unbounded => PlannerError::SolverTimeout {
                time_limit_secs: self.time_limit_secs,
            },
            other => PlannerError::SolverUnavailable(other.to_string()),
        })?;

        let objective = solution.value(min_tol) + EPS * solution.value(sum_tol);

        // Decode: each slot j with a non-null chosen config becomes its own
        // logical group (the known simplification described at the top of
        // this module). Ties in which config a slot picked cannot occur
        // since (e) forces exactly one `s[j][*]` to be 1.
        let mut placement = Placement::new_empty();
        for j in 0..m {
            let chosen_k = (0..k)
                .find(|&kk| solution.value(s[j][kk]) > 0.5)
                .expect("exclusivity constraint guarantees exactly one config per slot");
            if self.group_configs[chosen_k].is_null() {
                continue;
            }
            let mut group = Group::new(self.group_configs[chosen_k]);
            for i in 0..n {
                if solution.value(p[i][j]) > 0.5 {
                    group.models.insert(i);
                }
            }
            placement.groups.push(group);
        }

        Ok((placement, IlpReport { objective }))
    }
}

fn which_cbc() -> Result<()> {
    // `good_lp`'s coin_cbc backend shells out to the `cbc` binary; probing
    // for it here turns a missing install into a clean construction-time
    // error instead of a confusing solve-time one.
    let found = std::process::Command::new("cbc")
        .arg("-?")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success() || status.code().is_some())
        .unwrap_or(false);
    if found {
        Ok(())
    } else {
        Err(PlannerError::SolverUnavailable(
            "coin-cbc binary not found on PATH; install coinor-cbc".to_string(),
        ))
    }
}
