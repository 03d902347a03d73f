pub mod aggregations;
pub mod api;
pub mod collection;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod geo;
pub mod response;
pub mod service;

pub use config::Config;
pub use error::{Error, Result};
pub use service::ExploreService;
