//! Grid Console
//!
//! Operator-side reconciliation layer for a SCADA grid server: merges the
//! push channel, the polling fallback and optimistic control overrides into
//! one effective snapshot, aggregates threat detections, and serves both over
//! a local HTTP/WebSocket API.

pub mod api;
pub mod auth;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod domain;
pub mod polling;
pub mod reconcile;
pub mod telemetry;
pub mod threats;
pub mod transport;
pub mod upstream;
