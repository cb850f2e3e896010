//! Smoke checks against a deployed detection gateway.

pub mod client;
pub mod report;

pub use client::{Reply, SmokeClient, SmokeError, content_type_for};
