//! Hardware module detector constants and configuration.

pub mod config;
pub mod consts;
