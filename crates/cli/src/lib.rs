//! Autotest CLI
//!
//! Command-line interface for running autotest case directories and
//! inspecting what a root contains.

pub mod commands;
pub mod output;
