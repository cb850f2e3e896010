//! Serverless entry points around the detection service.
//!
//! [`EventHandler`] answers request/response events carrying a base64 image or
//! an image URL. [`DetectorWorker`] is a long-lived object with `predict` and
//! `health` methods taking raw image bytes. Neither lets a failure escape: every
//! error comes back as an [`Outcome::Error`].

pub mod config;
pub mod fetch;
pub mod handler;
pub mod http;
pub mod outcome;
pub mod worker;

pub use config::ServerlessConfig;
pub use fetch::{FetchError, ImageFetcher};
pub use handler::{EventHandler, HandlerData};
pub use outcome::Outcome;
pub use worker::DetectorWorker;
