pub mod access;
pub mod adapters;
pub mod api;
pub mod app;
pub mod billing;
pub mod client;
pub mod error;
pub mod generation;
pub mod providers;
pub mod storage;

pub use error::{Error, Result};
