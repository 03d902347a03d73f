//! HTTP adapter over [`crate::service::ExploreService`].

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ErrorBody;
pub use handlers::AppState;
pub use server::ApiServer;
