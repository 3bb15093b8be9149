//! Placement planner for multi-model inference serving clusters.
//!
//! Three cooperating strategies — [`ilp`], [`search`], [`greedy`] — produce
//! a [`placement::Placement`] for a fleet of models on a cluster of
//! accelerator devices, sharing the replica-insertion primitives in
//! [`primitives`], the scoring substrate in [`evaluator`], and the
//! evolutionary refinement pass in [`evolutionary`].

pub mod config;
pub mod error;
pub mod evaluator;
pub mod evolutionary;
pub mod greedy;
pub mod ilp;
pub mod parallel_config;
pub mod placement;
pub mod primitives;
pub mod profile;
pub mod report;
pub mod search;
pub mod workload;

pub use error::{PlannerError, Result};
pub use parallel_config::ParallelConfig;
pub use placement::{Group, Placement};
pub use profile::{capability, ClusterEnv, ModelData, ModelProfile, ProfileEntry};

/// Installs a `tracing-subscriber` formatter honoring `RUST_LOG`, defaulting
/// to `info`. Call once from a binary's `main`; safe to call more than once
/// in tests (errors from a second call are ignored).
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
