//! Relay Runner - drives streamed model output through the parser and into
//! per-element action queues.
//!
//! The [`Workbench`] is the library entry point: push cumulative stream text
//! in, get visible text back, and observe the actions it spawned. The `relay`
//! binary replays transcripts through a workbench.

pub mod config;
pub mod dry_run;
pub mod replay;
pub mod workbench;

pub use config::{ConfigError, RunnerConfig};
pub use dry_run::DryRunRuntime;
pub use replay::prefix_ends;
pub use workbench::{ElementSummary, Workbench, WorkbenchEvent};
