//! CLI command handlers.

pub mod consumer;
pub mod predict;
pub mod recommend;
pub mod sample;
pub mod train;
