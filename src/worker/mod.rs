pub mod feed;
pub mod metadata_fetcher;
pub mod normalizer;
pub mod parser;
pub mod pipeline;
pub mod transport;
pub mod working_set;

pub use feed::{FeedManager, FeedState, FeedStatus};
pub use metadata_fetcher::{MetadataFetcher, MetadataSource};
pub use normalizer::{NormalizedEvent, Normalizer};
pub use parser::{parse_message, DecodeError, FeedEvent, ParsedMessage};
pub use pipeline::{Control, IngestPipeline};
pub use transport::{FeedError, FeedSession, FeedTransport, WebSocketTransport};
pub use working_set::{Upsert, WorkingSet};
