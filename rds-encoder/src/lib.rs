//! # rds-encoder: now-playing to RDS bridge
//!
//! Reads "now playing" events as JSON lines (stdin or TCP), turns them into
//! RadioText and RT+ tags with `rds-core`, and keeps them on air through a
//! SmartGen encoder.
//!
//! Also ships `dummy-smartgen`, a stand-in encoder for bench testing.

pub mod config;
pub mod preview;
pub mod service;
pub mod source;
