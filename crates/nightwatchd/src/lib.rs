//! Nightwatch daemon library.
//!
//! Module map:
//! - **runtime**: container runtime trait, docker CLI driver, test double
//! - **observer**: log stream pumps, filter, debounce/cap batching
//! - **reasoner**: chat types, Ollama backend, gateway (tools/retry/repair)
//! - **capabilities**: the nine-capability library
//! - **orchestrator**: the per-incident resolution loop
//! - **executor**: direct command execution with stop-at-first-failure
//! - **console**: operator dialogs (questions, approval, escalation)
//! - **prompts**: system prompts for the reasoner roles

pub mod capabilities;
pub mod console;
pub mod executor;
pub mod observer;
pub mod orchestrator;
pub mod prompts;
pub mod reasoner;
pub mod runtime;
