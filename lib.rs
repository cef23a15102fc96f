pub mod annotate;
pub mod config;
pub mod dashboard;
pub mod detection;
pub mod engine;
pub mod error;
pub mod export;
pub mod location;
pub mod models;
pub mod onnx;
pub mod report;
pub mod sentiment;
pub mod session;
pub mod store;
pub mod threat;
pub mod weapons;

pub use error::{Error, Result};
