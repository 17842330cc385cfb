//! IO modules - external system interfaces
//!
//! - `geo` - Location provider boundary, watch rate limiting, subscriptions
//! - `replay` - Recorded fix trace served as a location provider
//! - `nominatim` - HTTP reverse geocoding client
//! - `backend` - Punch submission, employee sign-in and accounting rows
//! - `kv_store` - Durable key-value storage

pub mod backend;
pub mod geo;
pub mod kv_store;
pub mod nominatim;
pub mod replay;

// Re-export commonly used types
pub use backend::{AccountingSource, BackendClient, EmployeeAuth, PunchSubmitter};
pub use geo::{GeoProvider, Subscription, WatchOptions};
pub use kv_store::{FileStore, KeyValueStore, MemoryStore};
pub use nominatim::NominatimClient;
pub use replay::ReplayGeoProvider;
