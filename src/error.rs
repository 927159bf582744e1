use thiserror::Error;

/// Errors surfaced by the aggregation core.
///
/// `InvalidArgument` and `DuplicateFeed` are expected, user-correctable
/// conditions. Everything else is a system failure and is never swallowed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("feed `{0}` is already registered")]
    DuplicateFeed(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid feeds config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("could not encode feeds config: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("feed parse failed: {0}")]
    FeedParse(#[from] feed_rs::parser::ParseFeedError),
}

pub type Result<T> = std::result::Result<T, Error>;
