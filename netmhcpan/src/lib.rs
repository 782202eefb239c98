//! Core library for the NetMHCpan prediction wrapper.
//!
//! This library wraps the netMHCpan-4.2 binary behind typed prediction
//! requests, a parser for its text reports, and an asynchronous job
//! subsystem (store + manager) for long-running screens. The CLI and the
//! MCP server are thin layers over these modules.

#![allow(clippy::similar_names, clippy::items_after_statements)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

/// Module defining the command-line interface arguments and structs.
pub mod cli;

/// Module for handling CLI commands and their execution logic.
pub mod commands;

/// Module for loading configuration.
pub mod config;

/// Module containing shared constants and regex patterns.
pub mod constants;

/// Module defining the shared CLI entry point logic.
pub mod entry_point;

/// Module defining the crate's error types.
pub mod error;

/// Module for the multi-allele comparison export.
pub mod export;

/// Module containing the asynchronous job subsystem: durable records, the
/// filesystem store, and the manager that runs predictions off the caller's
/// request path.
pub mod jobs;

/// Module for rich CLI output formatting with colored text and spinners.
pub mod output;

/// Module parsing raw netMHCpan reports into structured records.
pub mod parser;

/// Module defining prediction requests and the foreground predictor.
pub mod predict;

/// Module running the predictor binary out of process.
pub mod runner;

/// Module containing utility functions shared across the crate.
pub mod utils;
