//! Core modules shared by every command.
//!
//! Configuration, errors, console output and the registry that records which
//! instances exist live here.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod output;
pub mod registry;
pub mod schemas;
pub mod time;
