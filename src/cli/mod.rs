//! CLI infrastructure for the autodrive experiment driver
//!
//! This module provides the command-line interface for training agents and
//! evaluating saved policies.

pub mod commands;
pub mod output;
