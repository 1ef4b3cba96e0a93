//! Content-link classification by URL inspection.
//!
//! Hosts are matched on the registered domain (the host itself or any
//! subdomain of it), so `mobile.x.com` is twitter but `box.com` is not.

use serde::Serialize;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Twitter,
    Youtube,
    Tiktok,
    Instagram,
    Telegram,
    Website,
    Unknown,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Twitter => "twitter",
            ContentType::Youtube => "youtube",
            ContentType::Tiktok => "tiktok",
            ContentType::Instagram => "instagram",
            ContentType::Telegram => "telegram",
            ContentType::Website => "website",
            ContentType::Unknown => "unknown",
        }
    }
}

/// Classification of a content URL plus whether it points at a single
/// embeddable item (a tweet, a video, a post).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentInfo {
    pub content_type: ContentType,
    pub embeddable: bool,
    /// Direct player URL, only known for YouTube videos
    pub embed_url: Option<String>,
}

impl ContentInfo {
    fn plain(content_type: ContentType) -> Self {
        Self {
            content_type,
            embeddable: false,
            embed_url: None,
        }
    }

    fn embeddable(content_type: ContentType) -> Self {
        Self {
            content_type,
            embeddable: true,
            embed_url: None,
        }
    }
}

/// Path fragments that live under a status-like URL but are not tweets.
const NON_TWEET_PATHS: [&str; 5] = [
    "/i/communities/",
    "/i/lists/",
    "/i/moments/",
    "/hashtag/",
    "/search",
];

fn host_is(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn is_numeric(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

fn is_tweet(url: &Url) -> bool {
    let path = url.path();
    if NON_TWEET_PATHS.iter().any(|p| path.contains(p)) {
        return false;
    }

    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    match segments.as_slice() {
        ["i", "web", "status", id, ..] => is_numeric(id),
        [user, "status", id, ..] => !user.is_empty() && is_numeric(id),
        _ => false,
    }
}

fn youtube_video_id(url: &Url, host: &str) -> Option<String> {
    let id = if host_is(host, "youtu.be") {
        url.path_segments()?.next().map(str::to_string)
    } else if url.path().contains("/watch") {
        url.query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())
    } else if let Some((_, rest)) = url.path().split_once("/embed/") {
        rest.split('/').next().map(str::to_string)
    } else {
        None
    };
    id.filter(|id| !id.is_empty())
}

fn is_tiktok_video(url: &Url) -> bool {
    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    segments.windows(3).any(|w| {
        w[0].len() > 1 && w[0].starts_with('@') && w[1] == "video" && is_numeric(w[2])
    })
}

fn is_instagram_post(url: &Url) -> bool {
    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    segments.windows(2).any(|w| {
        (w[0] == "p" || w[0] == "reel")
            && !w[1].is_empty()
            && w[1]
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    })
}

/// Classifies a content URL.
///
/// Unparseable URLs and non-http(s) schemes are `Unknown`; any other
/// web URL that is not a recognised platform is a `Website`.
pub fn detect(raw: &str) -> ContentInfo {
    let Ok(url) = Url::parse(raw.trim()) else {
        return ContentInfo::plain(ContentType::Unknown);
    };
    if url.scheme() != "http" && url.scheme() != "https" {
        return ContentInfo::plain(ContentType::Unknown);
    }
    let Some(host) = url.host_str().map(|h| h.to_lowercase()) else {
        return ContentInfo::plain(ContentType::Unknown);
    };

    if host_is(&host, "twitter.com") || host_is(&host, "x.com") {
        return ContentInfo {
            content_type: ContentType::Twitter,
            embeddable: is_tweet(&url),
            embed_url: None,
        };
    }

    if host_is(&host, "youtube.com") || host_is(&host, "youtu.be") {
        return match youtube_video_id(&url, &host) {
            Some(id) => ContentInfo {
                content_type: ContentType::Youtube,
                embeddable: true,
                embed_url: Some(format!("https://www.youtube.com/embed/{}", id)),
            },
            None => ContentInfo::plain(ContentType::Youtube),
        };
    }

    if host_is(&host, "tiktok.com") {
        return if is_tiktok_video(&url) {
            ContentInfo::embeddable(ContentType::Tiktok)
        } else {
            ContentInfo::plain(ContentType::Tiktok)
        };
    }

    if host_is(&host, "instagram.com") {
        return if is_instagram_post(&url) {
            ContentInfo::embeddable(ContentType::Instagram)
        } else {
            ContentInfo::plain(ContentType::Instagram)
        };
    }

    if host_is(&host, "t.me") || host_is(&host, "telegram.me") || host_is(&host, "telegram.org")
    {
        return ContentInfo::plain(ContentType::Telegram);
    }

    ContentInfo::plain(ContentType::Website)
}
