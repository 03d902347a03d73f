//! Everything that talks to the backing engine: the request DSL, the
//! compiler producing it, the response shape and the backends.

pub mod backend;
pub mod builder;
pub mod elasticsearch;
pub mod memory;
pub mod request;
pub mod response;

pub use backend::AggregationBackend;
pub use builder::RequestBuilder;
pub use elasticsearch::ElasticsearchBackend;
pub use memory::MemoryBackend;
pub use request::SearchRequest;
pub use response::{BucketAggregation, EngineBucket, EngineResponse};
