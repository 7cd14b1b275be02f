//! The financial posting engine and its components

pub mod allocation;
pub mod builder;
pub mod engine;
pub mod reversal;
pub mod status;

pub use engine::PostingEngine;
