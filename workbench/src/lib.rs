//! Retrieval-augmented chat service.
//!
//! A request passes the [`gate::RequestGate`], is answered from the
//! [`cache::ResponseCache`] when possible, and otherwise runs the
//! [`pipeline::OrchestrationPipeline`]. The [`metrics::MetricsRegistry`]
//! aggregates what happened.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod gate;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod services;
pub mod trace;
