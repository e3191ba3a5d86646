//! # Care Plan Core
//!
//! Core business logic for the care plan generator.
//!
//! This crate contains the domain operations and their SQLite persistence:
//! - Order intake with field validation and duplicate detection
//! - Prompt construction with few-shot examples and the outbound model call
//! - Care plan storage, editing, download and CSV export
//!
//! **No API concerns**: HTTP servers and command-line parsing belong in `api-rest` and `cli`.
//! Configuration is resolved by the binaries and passed in as [`CoreConfig`].

pub mod admin;
pub mod care_plan;
pub mod config;
pub mod constants;
pub mod database;
pub mod duplicates;
pub mod error;
pub mod export;
pub mod intake;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod repositories;
pub mod validation;

pub use config::{CoreConfig, LlmSettings};
pub use error::{CarePlanError, CarePlanResult};
pub use llm::LlmClient;
