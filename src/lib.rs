// src/lib.rs
pub mod aggregator;
pub mod config;
pub mod discord;
pub mod models;
pub mod presenter;
pub mod probe;
pub mod publisher;
pub mod scheduler;
pub mod utils;
