//! Integration layer: the store client interface and the snapshot fetcher.

pub mod fetcher;
pub mod store;

pub use fetcher::{ConfigFetcher, DEFAULT_EXTENSIONS_DIR, DEFAULT_ROOT, KeyLayout};
pub use store::{ChangeKind, FetchResponse, StoreClient, StoreEntry, StoreEvent, WatchStream};
