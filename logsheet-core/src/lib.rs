#![doc = "logsheet-core: core pipeline for turning CDN access logs into a spreadsheet report."]

//! This crate holds every stage of the pipeline and the object-store seam it
//! runs against. Entry points (command line, serverless handler) live in the
//! `logsheet` crate and only supply configuration and a [`contract::LogStore`].
//!
//! Start at [`pipeline::run_batch`].

pub mod aggregate;
pub mod config;
pub mod contract;
pub mod convert;
pub mod decode;
pub mod download;
pub mod error;
pub mod listing;
pub mod package;
pub mod pipeline;
pub mod publish;
pub mod s3;

pub use config::{Limits, PipelineConfig, StorageLocation};
pub use error::{PipelineError, StoreError};
