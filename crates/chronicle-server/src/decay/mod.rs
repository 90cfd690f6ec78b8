// decay/mod.rs
// Salience decay: pure engine + periodic scheduler

pub mod context;
pub mod engine;
pub mod params;
pub mod scheduler;

pub use context::EnvironmentalContext;
pub use engine::{DecayInput, DecayModifiers, DecayOutcome, compute_decay};
pub use scheduler::{DecayConfig, DecayScheduler};
