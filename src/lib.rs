// src/lib.rs

//! jobwatch: job posting ingestion, scoring and once-only notification.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
