// Shared library for the training control panel and the agent binaries.

pub mod config;
pub mod trainer;
pub mod web;
