pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod providers;
pub mod store;

pub use config::EchoHireConfig;
pub use error::{EchoHireError, ServiceError, StoreError};
pub use providers::{
    create_analysis_provider, create_call_provider, AnalysisProvider, CallProvider,
    ProviderError, ProviderErrorKind,
};
pub use store::{DocumentStore, MemoryStore, PgStore};
