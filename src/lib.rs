pub mod config;
pub mod db;
pub mod embed;
pub mod grouping;
pub mod utils;
pub mod worker;

pub use config::Settings;
pub use db::{MemoryStore, PersistenceWriter, PostgresClient, Store, TokenStore};
pub use embed::{EmbedProxy, EmbedResult};
pub use grouping::{ContentGroup, GroupView};
pub use worker::{FeedManager, IngestPipeline, MetadataFetcher, WebSocketTransport};
