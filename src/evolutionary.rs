//! Evolutionary refinement (§4.E): mutate a population of placements
//! across `generations` rounds, scoring parents and offspring together each
//! round and keeping the top `pop_size`. Deterministic given a seed
//! (`ChaCha8Rng`), matching the teacher's choice of `rand` for anything
//! needing a PRNG.

use rand::seq::SliceRandom;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::evaluator::PlacementEvaluator;
use crate::parallel_config::{factors, ParallelConfig};
use crate::placement::Placement;
use crate::profile::{ClusterEnv, ModelData};

const DEFAULT_SEED: u64 = 0;

/// One of the three mutation operators of §4.E, chosen uniformly at random
/// each time a child is produced. Each is a transaction: it either returns
/// a new placement with the device-count invariant intact, or `None` if no
/// legal mutation exists (e.g. nothing to swap, or the repartition would
/// cross a node boundary) — the caller discards a `None` without scoring it.
fn mutate(
    placement: &Placement,
    model_datas: &[ModelData],
    cluster_env: &ClusterEnv,
    rng: &mut ChaCha8Rng,
) -> Option<Placement> {
    match rng.gen_range(0..3) {
        0 => move_replica(placement, model_datas, cluster_env, rng),
        1 => swap_replicas(placement, rng),
        _ => repartition_adjacent(placement, cluster_env, rng),
    }
}

fn fits(model: &ModelData, cfg: ParallelConfig, existing_mem: f64, mem_budget: f64) -> bool {
    match model.profile.get(cfg) {
        Some(entry) => existing_mem + entry.max_stage_mem() <= mem_budget,
        None => false,
    }
}

fn group_mem_used(placement: &Placement, group_index: usize, model_datas: &[ModelData], exclude: usize) -> f64 {
    let group = &placement.groups[group_index];
    group
        .models
        .iter()
        .filter(|&&mi| mi != exclude)
        .map(|&mi| {
            model_datas[mi]
                .profile
                .get(group.config)
                .map(|e| e.max_stage_mem())
                .unwrap_or(0.0)
        })
        .sum()
}

/// (i) move one replica between groups.
fn move_replica(
    placement: &Placement,
    model_datas: &[ModelData],
    cluster_env: &ClusterEnv,
    rng: &mut ChaCha8Rng,
) -> Option<Placement> {
    let source_candidates: Vec<usize> = placement
        .groups
        .iter()
        .enumerate()
        .filter(|(_, g)| !g.models.is_empty())
        .map(|(i, _)| i)
        .collect();
    let source_gi = *source_candidates.choose(rng)?;
    let model_index = *placement.groups[source_gi].models.iter().copied().collect::<Vec<_>>().choose(rng)?;

    let dest_candidates: Vec<usize> = (0..placement.groups.len())
        .filter(|&gi| {
            gi != source_gi
                && !placement.groups[gi].config.is_null()
                && !placement.groups[gi].models.contains(&model_index)
        })
        .collect();
    let dest_gi = *dest_candidates.choose(rng)?;

    let model = &model_datas[model_index];
    let used = group_mem_used(placement, dest_gi, model_datas, usize::MAX);
    if !fits(model, placement.groups[dest_gi].config, used, cluster_env.mem_budget_per_device) {
        return None;
    }

    let mut next = placement.clone();
    next.remove_model_from_group(source_gi, model_index).ok()?;
    next.add_model_to_group(dest_gi, model_index).ok()?;
    Some(next)
}

/// (ii) swap two replicas between two groups.
fn swap_replicas(placement: &Placement, rng: &mut ChaCha8Rng) -> Option<Placement> {
    let nonempty: Vec<usize> = placement
        .groups
        .iter()
        .enumerate()
        .filter(|(_, g)| !g.models.is_empty())
        .map(|(i, _)| i)
        .collect();
    if nonempty.len() < 2 {
        return None;
    }
    let mut chosen = nonempty;
    chosen.shuffle(rng);
    let (g1, g2) = (chosen[0], chosen[1]);

    let m1 = *placement.groups[g1].models.iter().copied().collect::<Vec<_>>().choose(rng)?;
    let candidates_m2: Vec<usize> = placement.groups[g2]
        .models
        .iter()
        .filter(|&&m| m != m1)
        .copied()
        .collect();
    let m2 = *candidates_m2.choose(rng)?;

    if placement.groups[g1].models.contains(&m2) || placement.groups[g2].models.contains(&m1) {
        return None; // already present, swap would be a no-op / duplicate
    }

    let mut next = placement.clone();
    next.remove_model_from_group(g1, m1).ok()?;
    next.add_model_to_group(g1, m2).ok()?;
    next.remove_model_from_group(g2, m2).ok()?;
    next.add_model_to_group(g2, m1).ok()?;
    Some(next)
}

/// (iii) repartition two adjacent groups into a different factorization of
/// their combined size, carrying over whichever models still fit.
fn repartition_adjacent(placement: &Placement, cluster_env: &ClusterEnv, rng: &mut ChaCha8Rng) -> Option<Placement> {
    if placement.groups.len() < 2 {
        return None;
    }
    let gi = rng.gen_range(0..placement.groups.len() - 1);
    let (g1, g2) = (&placement.groups[gi], &placement.groups[gi + 1]);
    let combined = (g1.config.size() + g2.config.size()) as usize;
    if combined == 0 || !cluster_env.group_size_is_legal(combined) {
        return None;
    }

    let current_shapes = [(g1.config.op, g1.config.pp), (g2.config.op, g2.config.pp)];
    let alt_factorizations: Vec<(u32, u32)> = factors(combined)
        .into_iter()
        .map(|pp| (combined as u32 / pp as u32, pp as u32))
        .filter(|&(op, pp)| !current_shapes.contains(&(op, pp)))
        .collect();
    let &(op, pp) = alt_factorizations.choose(rng)?;
    let new_cfg = ParallelConfig::new(1, op, pp);

    let mut merged_models: Vec<usize> = g1.models.iter().chain(g2.models.iter()).copied().collect();
    merged_models.sort_unstable();
    merged_models.dedup();

    let mut next = placement.clone();
    next.groups.remove(gi + 1);
    next.groups[gi] = crate::placement::Group::new(new_cfg);
    for mi in merged_models {
        // models whose profile doesn't cover the new config are dropped
        // (left unplaced) rather than aborting the whole mutation.
        let _ = next.add_model_to_group(gi, mi);
    }
    Some(next)
}

/// §4.E `evolutionary_search`. `pop_size` is the larger of the seed
/// population's size and 4, so a single-placement seed still gets room to
/// diversify.
pub fn evolutionary_search(
    seed_population: Vec<Placement>,
    model_datas: &[ModelData],
    cluster_env: &ClusterEnv,
    evaluator: &PlacementEvaluator,
    generations: u32,
    verbose: bool,
) -> Placement {
    evolutionary_search_seeded(
        seed_population,
        model_datas,
        cluster_env,
        evaluator,
        generations,
        DEFAULT_SEED,
        verbose,
    )
}

pub fn evolutionary_search_seeded(
    seed_population: Vec<Placement>,
    model_datas: &[ModelData],
    cluster_env: &ClusterEnv,
    evaluator: &PlacementEvaluator,
    generations: u32,
    seed: u64,
    verbose: bool,
) -> Placement {
    assert!(!seed_population.is_empty(), "evolutionary_search needs a seed population");
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let pop_size = seed_population.len().max(4);

    let mut population = seed_population;
    while population.len() < pop_size {
        let clone_of = population[population.len() % population.len().max(1)].clone();
        population.push(clone_of);
    }

    let mut best_score = f64::NEG_INFINITY;
    let mut best = population[0].clone();

    for gen in 0..generations {
        let mut offspring = Vec::with_capacity(population.len());
        for parent in &population {
            if let Some(child) = mutate(parent, model_datas, cluster_env, &mut rng) {
                offspring.push(child);
            }
        }

        let mut pool = population.clone();
        pool.extend(offspring);
        let scores = evaluator.get_scores(&pool);

        let mut ranked: Vec<(usize, f64)> = scores.into_iter().enumerate().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(pop_size);

        let gen_best = ranked[0];
        if gen_best.1 > best_score {
            best_score = gen_best.1;
            best = pool[gen_best.0].clone();
        }

        population = ranked.into_iter().map(|(i, _)| pool[i].clone()).collect();

        if verbose {
            tracing::debug!(gen, best_score, "evolutionary_search generation complete");
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::EvalMethod;
    use crate::profile::{ModelProfile, ProfileEntry};

    fn model(rate: f64, cfg: ParallelConfig) -> ModelData {
        let mut profile = ModelProfile::default();
        profile.insert(
            cfg,
            ProfileEntry {
                latency: [(1usize, vec![0.1])].into_iter().collect(),
                weight_mem: vec![1.0],
            },
        );
        ModelData {
            name: "m".into(),
            request_rate: rate,
            slo_seconds: 1.0,
            profile,
        }
    }

    #[test]
    fn best_observed_score_is_monotone_across_generations() {
        let cfg = ParallelConfig::new(1, 1, 1);
        let models = vec![model(1.0, cfg), model(1.0, cfg)];
        let env = ClusterEnv {
            num_devices: 2,
            num_devices_per_node: 2,
            mem_budget_per_device: 4.0,
        };
        let workload = crate::workload::gen_train_workload(&models);
        let evaluator = PlacementEvaluator::new(models.clone(), env, workload, EvalMethod::FastSimulator, false);

        let seed = Placement::from_skeleton([cfg, cfg]);
        let mut running_best = f64::NEG_INFINITY;
        for gens in [1, 2, 4, 8] {
            let best = evolutionary_search(vec![seed.clone()], &models, &env, &evaluator, gens, false);
            let score = evaluator.get_scores(std::slice::from_ref(&best))[0];
            assert!(score >= running_best - 1e-9);
            running_best = score;
        }
    }

    #[test]
    fn is_deterministic_given_a_seed() {
        let cfg = ParallelConfig::new(1, 1, 1);
        let models = vec![model(1.0, cfg), model(1.0, cfg)];
        let env = ClusterEnv {
            num_devices: 2,
            num_devices_per_node: 2,
            mem_budget_per_device: 4.0,
        };
        let workload = crate::workload::gen_train_workload(&models);
        let evaluator = PlacementEvaluator::new(models.clone(), env, workload, EvalMethod::FastSimulator, false);
        let seed = Placement::from_skeleton([cfg, cfg]);

        let a = evolutionary_search_seeded(vec![seed.clone()], &models, &env, &evaluator, 5, 42, false);
        let b = evolutionary_search_seeded(vec![seed], &models, &env, &evaluator, 5, 42, false);
        assert_eq!(a, b);
    }
}
