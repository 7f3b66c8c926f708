pub mod codec;
pub mod config;
pub mod database;
pub mod errors;
pub mod ingestor;
pub mod models;
pub mod repositories;
pub mod sources;
pub mod utils;
