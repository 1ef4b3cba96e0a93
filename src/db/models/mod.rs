mod content_link;
mod token;

pub use content_link::{ContentLink, LinkKind};
pub use token::{TokenMetadata, TokenRecord, TokenSummary};
