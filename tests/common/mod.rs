#![allow(dead_code)]

pub mod builders;
pub mod harness;

// Re-export commonly used test utilities
pub use builders::{embedding, listings_table, TableBuilder};
pub use harness::TestHarness;
