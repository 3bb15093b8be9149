//! Replica placement primitives (§4.C): given a skeleton placement with
//! group configs already chosen but model sets possibly empty, insert
//! replicas to maximize evaluator score under the per-device memory budget.
//!
//! All three primitives share the same marginal-gain core: at each round,
//! try every `(group, model)` pair not yet assigned, keep the single
//! insertion with the largest score improvement (ties broken by lowest
//! group index, then lowest model index — guaranteed by iterating both axes
//! in ascending order and only replacing the incumbent on a strict
//! improvement), and stop when no insertion improves the score or every
//! group is out of memory.

use crate::evaluator::PlacementEvaluator;
use crate::parallel_config::ParallelConfig;
use crate::placement::Placement;
use crate::profile::{capability, ClusterEnv, ModelData};

const MAX_BS: usize = 1;
const IMPROVEMENT_EPS: f64 = 1e-9;

fn fits_memory(
    placement: &Placement,
    group_index: usize,
    model_index: usize,
    model_datas: &[ModelData],
    cluster_env: &ClusterEnv,
) -> bool {
    let group = &placement.groups[group_index];
    if group.models.contains(&model_index) {
        return false;
    }
    let model = &model_datas[model_index];
    let Some(entry) = model.profile.get(group.config) else {
        return false;
    };
    let used: f64 = group
        .models
        .iter()
        .map(|&mi| {
            model_datas[mi]
                .profile
                .get(group.config)
                .map(|e| e.max_stage_mem())
                .unwrap_or(0.0)
        })
        .sum();
    used + entry.max_stage_mem() <= cluster_env.mem_budget_per_device
}

/// Score a placement, preferring the real evaluator and falling back to the
/// deterministic capability/rate heuristic described in §4.C when no
/// evaluator is supplied. Unlike the ILP objective's min-tolerance term,
/// this must be *additive* across models: every insertion primitive only
/// ever grows one model's capability, so a min-over-models score stays
/// pinned at whichever model is still unplaced and never shows a marginal
/// gain, stalling `fast_greedy`/`beam_search` immediately. Summing each
/// model's rate-weighted, SLO-capped goodput (the same shape as the
/// evaluator's fast-simulator score) keeps every single insertion a
/// strict improvement.
fn score(placement: &Placement, model_datas: &[ModelData], evaluator: Option<&PlacementEvaluator>) -> f64 {
    match evaluator {
        Some(eval) => eval.get_scores(std::slice::from_ref(placement))[0],
        None => heuristic_score(placement, model_datas),
    }
}

fn heuristic_score(placement: &Placement, model_datas: &[ModelData]) -> f64 {
    let caps = placement.total_capability_per_model(model_datas, MAX_BS);
    model_datas
        .iter()
        .zip(caps.iter())
        .map(|(m, &cap)| {
            if m.request_rate > 0.0 {
                m.request_rate * (cap / m.request_rate).min(1.0)
            } else {
                0.0
            }
        })
        .sum()
}

enum Scope {
    AllGroups,
    LastGroupOnly,
}

fn best_insertion(
    placement: &Placement,
    model_datas: &[ModelData],
    cluster_env: &ClusterEnv,
    evaluator: Option<&PlacementEvaluator>,
    base_score: f64,
    scope: &Scope,
) -> Option<(usize, usize, f64)> {
    let group_range = match scope {
        Scope::AllGroups => 0..placement.groups.len(),
        Scope::LastGroupOnly => {
            if placement.groups.is_empty() {
                0..0
            } else {
                placement.groups.len() - 1..placement.groups.len()
            }
        }
    };

    let mut best: Option<(usize, usize, f64)> = None;
    for gi in group_range {
        if placement.groups[gi].config.is_null() {
            continue;
        }
        for mi in 0..model_datas.len() {
            if !fits_memory(placement, gi, mi, model_datas, cluster_env) {
                continue;
            }
            if capability(&model_datas[mi], placement.groups[gi].config, MAX_BS) <= 0.0 {
                continue;
            }
            let mut candidate = placement.clone();
            candidate.add_model_to_group(gi, mi).unwrap();
            let gain = score(&candidate, model_datas, evaluator) - base_score;
            let is_better = match best {
                Some((_, _, best_gain)) => gain > best_gain + IMPROVEMENT_EPS,
                None => gain > IMPROVEMENT_EPS,
            };
            if is_better {
                best = Some((gi, mi, gain));
            }
        }
    }
    best
}

fn run_greedy(
    mut placement: Placement,
    model_datas: &[ModelData],
    cluster_env: &ClusterEnv,
    evaluator: Option<&PlacementEvaluator>,
    scope: Scope,
    verbose: bool,
) -> Placement {
    loop {
        let base_score = score(&placement, model_datas, evaluator);
        match best_insertion(&placement, model_datas, cluster_env, evaluator, base_score, &scope) {
            Some((gi, mi, gain)) => {
                placement.add_model_to_group(gi, mi).unwrap();
                if verbose {
                    tracing::debug!(group = gi, model = mi, gain, "fast_greedy insertion");
                }
            }
            None => break,
        }
    }
    placement
}

/// §4.C `fast_greedy`.
pub fn fast_greedy(
    skeleton: Placement,
    model_datas: &[ModelData],
    cluster_env: &ClusterEnv,
    evaluator: Option<&PlacementEvaluator>,
    verbose: bool,
) -> Placement {
    run_greedy(skeleton, model_datas, cluster_env, evaluator, Scope::AllGroups, verbose)
}

/// §4.C `on_last_group`: restricted to the last group of the skeleton, used
/// by the beam-constructive enumerative path that grows placements one
/// group at a time.
pub fn replica_placement_on_last_group(
    skeleton: Placement,
    model_datas: &[ModelData],
    cluster_env: &ClusterEnv,
    evaluator: Option<&PlacementEvaluator>,
    verbose: bool,
) -> Placement {
    run_greedy(skeleton, model_datas, cluster_env, evaluator, Scope::LastGroupOnly, verbose)
}

/// §4.C `beam_search(k)`: the same greedy step, keeping the top-`k` partial
/// placements by score at each round. Terminates when every beam is at a
/// local optimum (no beam has any improving insertion left).
pub fn beam_search(
    skeleton: Placement,
    model_datas: &[ModelData],
    cluster_env: &ClusterEnv,
    evaluator: Option<&PlacementEvaluator>,
    k: usize,
    verbose: bool,
) -> Placement {
    assert!(k >= 1, "beam size must be >= 1");
    let mut beams = vec![skeleton];

    loop {
        let mut candidates: Vec<(Placement, f64)> = Vec::new();
        let mut any_improved = false;

        for beam in &beams {
            let base_score = score(beam, model_datas, evaluator);
            for gi in 0..beam.groups.len() {
                if beam.groups[gi].config.is_null() {
                    continue;
                }
                for mi in 0..model_datas.len() {
                    if !fits_memory(beam, gi, mi, model_datas, cluster_env) {
                        continue;
                    }
                    if capability(&model_datas[mi], beam.groups[gi].config, MAX_BS) <= 0.0 {
                        continue;
                    }
                    let mut candidate = beam.clone();
                    candidate.add_model_to_group(gi, mi).unwrap();
                    let candidate_score = score(&candidate, model_datas, evaluator);
                    if candidate_score > base_score + IMPROVEMENT_EPS {
                        any_improved = true;
                    }
                    candidates.push((candidate, candidate_score));
                }
            }
            // the beam itself survives as a candidate for its own local optimum
            candidates.push((beam.clone(), base_score));
        }

        if !any_improved {
            break;
        }

        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        candidates.dedup_by(|a, b| a.0 == b.0);
        candidates.truncate(k);
        beams = candidates.into_iter().map(|(p, _)| p).collect();

        if verbose {
            tracing::debug!(beams = beams.len(), "beam_search round complete");
        }
    }

    beams
        .into_iter()
        .max_by(|a, b| {
            score(a, model_datas, evaluator)
                .partial_cmp(&score(b, model_datas, evaluator))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or_else(Placement::new_empty)
}

/// A placeholder [`ParallelConfig`] helper used by planners building
/// pipeline-only skeletons (`(1, op, pp)` / `(1, 1, group_size)`).
pub fn pipeline_only(group_size: u32) -> ParallelConfig {
    ParallelConfig::new(1, 1, group_size)
}
