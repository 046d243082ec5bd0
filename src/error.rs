use std::num::ParseIntError;

/// Failure to turn one raw access-log line into a `LogRecord`.
///
/// Every variant carries the offending text so the caller can log the line
/// and move on to the next one.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("line does not match the access log format: {line}")]
    Mismatch { line: String },

    #[error("failed to parse request time {token:?}: {source}")]
    Time {
        token: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("request time {token:?} is not in DD/Mon/YYYY:HH:MM:SS form")]
    TimeLayout { token: String },

    #[error("request time {token:?} does not exist in the local time zone")]
    NonexistentLocalTime { token: String },

    #[error("invalid {field} value {value:?}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// Failure while checking the `e` expiry parameter of a record's URL.
#[derive(Debug, thiserror::Error)]
pub enum ExpiryError {
    #[error("failed to parse url {url:?}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to parse query {query:?}: {reason} (url: {url})")]
    Query {
        query: String,
        reason: String,
        url: String,
    },

    #[error("expiry value {value:?} is not an integer: {source} (url: {url})")]
    InvalidExpiry {
        value: String,
        url: String,
        #[source]
        source: ParseIntError,
    },

    #[error("expiry {seconds} is outside the representable time range (url: {url})")]
    ExpiryOutOfRange { seconds: i64, url: String },
}

/// The extraction pattern and the field table disagree. Raised once, when the
/// parser is built, never while decoding.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to compile access log pattern")]
    Pattern(#[from] regex::Error),

    #[error("field {field:?} {reason}")]
    Drift { field: String, reason: &'static str },
}
