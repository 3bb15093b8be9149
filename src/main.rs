//! Demo driver: load a cluster/solver config and a model profile database,
//! run one placement policy, and print the result as a TSV row in the
//! format described in §6. This is a convenience for local experimentation,
//! not the benchmark driver CLI (out of scope, §1).

use std::path::PathBuf;

use clap::Parser;
use placement_planner::config::{PlannerConfig, PolicyKind};
use placement_planner::evaluator::{EvalMethod, PlacementEvaluator};
use placement_planner::greedy::GreedyPlanner;
use placement_planner::ilp::IlpPlanner;
use placement_planner::profile::ModelData;
use placement_planner::report::{write_tsv_row, TsvRow};
use placement_planner::search::SearchPlanner;
use placement_planner::workload::gen_train_workload;

#[derive(Debug, Parser)]
#[command(about = "Plan a model-to-device placement for one cluster/policy configuration")]
struct Cli {
    /// Path to a PlannerConfig TOML file (cluster env + solver knobs).
    #[arg(short, long)]
    config: PathBuf,

    /// Path to a JSON array of `ModelData` describing the model fleet.
    #[arg(short, long)]
    models: PathBuf,

    /// Label written into the `policy_name` TSV column.
    #[arg(short, long, default_value = "policy")]
    label: String,
}

fn main() -> anyhow::Result<()> {
    placement_planner::init_tracing();
    let args = Cli::parse();

    let config = PlannerConfig::from_toml_file(&args.config)?;
    let models_text = std::fs::read_to_string(&args.models)?;
    let model_datas: Vec<ModelData> = serde_json::from_str(&models_text)?;

    let workload = gen_train_workload(&model_datas);
    let evaluator = PlacementEvaluator::new(
        model_datas.clone(),
        config.cluster_env,
        workload,
        EvalMethod::FastSimulator,
        config.parallel_evaluator,
    );

    let (placement, objective) = match config.policy {
        PolicyKind::Ilp => {
            let planner = IlpPlanner::new()?
                .with_time_limit(config.ilp_time_limit_secs)
                .with_threads(num_cpus::get());
            let (placement, report) = planner.solve(&model_datas, &config.cluster_env)?;
            (placement, Some(report.objective))
        }
        PolicyKind::Search => {
            let mut planner = SearchPlanner::default();
            planner.add_evo_search = config.add_evo_search;
            planner.evo_generations = config.evo_generations;
            let placement = planner.solve(&model_datas, &config.cluster_env, &evaluator);
            (placement, None)
        }
        PolicyKind::Greedy => {
            let mut planner = GreedyPlanner::new(config.greedy_group_size);
            planner.add_evo_search = config.add_evo_search;
            planner.evo_generations = config.evo_generations;
            let placement = planner.solve(&model_datas, &config.cluster_env, &evaluator)?;
            (placement, None)
        }
    };

    let goodput = evaluator.get_scores(std::slice::from_ref(&placement))[0];
    tracing::info!(?objective, goodput, "placement solved");

    let max_slo = model_datas
        .iter()
        .map(|m| m.slo_seconds)
        .fold(0.0_f64, f64::max);
    let total_rate: f64 = model_datas.iter().map(|m| m.request_rate).sum();

    let row = TsvRow {
        policy_name: args.label,
        slo: max_slo,
        goodput,
        arrival_process: placement_planner::workload::GammaProcess {
            rate: total_rate,
            cv: 1.0,
        },
    };
    write_tsv_row(std::io::stdout(), &row)?;

    Ok(())
}
