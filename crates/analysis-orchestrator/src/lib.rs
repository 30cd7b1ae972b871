pub mod cycle;
pub mod pipeline;

pub use cycle::{CycleContext, CycleReport, CycleServices};
pub use pipeline::{SignalPipeline, SymbolOutcome};
