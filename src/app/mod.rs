mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::SentrycamOrchestrator;
pub use state::ComponentStates;
pub use types::{ComponentState, ShutdownReason};
