/*
[INPUT]:  Public API exports for taskslot-cli crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point for the scenario runner
[UPDATE]: When adding new modules or public exports
*/

pub mod scenario;

pub use scenario::{DemoError, ScenarioConfig, ScenarioReport, Step, StepOutcome, run_scenario};
