//! pod-restarter: crashloop remediation and dependency-aware restarts
//!
//! This crate decides whether pods are available or stuck in a crashloop,
//! and drives a small loop that deletes crashlooping pods and rolls the
//! workloads that depend on a service once that service recovers.

pub mod config;
pub mod controller;
pub mod error;
pub mod health;

pub use crate::error::{Error, Result};
