pub mod db;
pub mod error;
pub mod repositories;
pub mod store;
pub mod traits;

pub use error::StorageError;
pub use store::SqliteStore;
pub use traits::{MarketDataStore, SignalSink};
