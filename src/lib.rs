pub mod cli;
pub mod config;
pub mod data;
pub mod db;
pub mod embedding;
pub mod error;
pub mod features;
pub mod init;
pub mod models;
pub mod registry;
pub mod repository;
pub mod services;
pub mod utils;

pub use error::AutoembedError;
