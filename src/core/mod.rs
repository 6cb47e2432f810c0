//! Core chat components
//!
//! This module contains the chat workflow and the pieces it is built from:
//! conversation memory and the step runner.

mod chat;
mod memory;
mod steps;

pub use chat::{ChatError, ChatWorkflow};
pub use memory::{ChatStore, MemoryStore};
pub use steps::{LocalStepRunner, StepPolicy};
