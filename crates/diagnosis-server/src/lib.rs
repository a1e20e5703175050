//! Diagnosis server: configuration and the HTTP surface hosting the engine

pub mod api;
pub mod config;
