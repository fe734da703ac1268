//! Prometheus exporter for Slurm node states and scheduler statistics.
//!
//! Reports come from `sinfo`, `sdiag` and `scontrol`; the [`nodes`] and
//! [`scheduler`] modules turn them into typed snapshots and [`export`]
//! publishes those as gauges.

pub mod agent;
pub mod config;
pub mod export;
pub mod nodes;
pub mod scheduler;
pub mod slurm;
