//! Pipeline glue: sequencing the client steps and signalling success.

pub mod notifier;
pub mod orchestrator;
