//! Pure spatial logic for Deepfield.
//!
//! This crate holds the math and data definitions that are independent of
//! any registry, runtime, or storage backend. Functions take plain data
//! and return results, so they can be unit-tested in isolation and shared
//! between the simulation core and headless tooling.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`bubble`] | Bubble-of-influence falloff and apparent-scale factor |
//! | [`config`] | Configuration surface (bubble, rebase, persistence) and validation |
//! | [`error`] | Configuration and registration errors |
//! | [`sector`] | Integer sector grid, adjacency and world/sector conversion |

pub mod bubble;
pub mod config;
pub mod error;
pub mod sector;

pub use error::ConfigError;
