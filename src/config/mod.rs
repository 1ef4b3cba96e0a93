mod config;

pub use config::{
    EmbedSettings, FeedSettings, MetadataSettings, PostgresSettings, Settings, WorkingSetSettings,
};
