// Library crate exposing modules for the binary and integration tests

pub mod analysis;
pub mod config;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod repository;
pub mod service;
pub mod util;
