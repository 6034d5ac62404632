pub mod artifact;
pub mod collaborator;
pub mod config;
pub mod data;
pub mod errors;
pub mod ledger;
pub mod orchestrator;
pub mod runner;
pub mod script;
pub mod table;

// The types most embedders need, re-exported at the crate root.
pub use config::Settings;
pub use orchestrator::{MiningPipeline, MiningSummary};
pub use runner::ExecutionOutcome;
pub use table::{Column, Frame};
