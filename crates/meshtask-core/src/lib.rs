//! meshtask-core — task batch model, wire helpers, and configuration.
//! The services and CLI crates depend on this one.

pub mod config;
pub mod task;
pub mod wire;

pub use task::{HexId, HexIdError, Opcode, RequestAction, Schedule, TaskAction, TaskBatch};
pub use wire::{QoS, ResponsePayload};
