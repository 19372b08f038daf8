//! Integration tests for the re-signing pipeline
//!
//! Run with: cargo test --test integration

mod cli;
mod end_to_end;
mod helpers;
mod zip_pipeline;
