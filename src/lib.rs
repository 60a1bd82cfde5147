pub mod clock;
pub mod config;
pub mod content;
pub mod logging;
pub mod srs;
pub mod storage;

pub use clock::{Clock, FixedClock, SystemClock};
pub use content::{CatalogWord, ContentStore, InMemoryContentStore};
pub use storage::{Storage, StorageError, StorageResult};
