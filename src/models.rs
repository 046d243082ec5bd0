use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;
use std::fmt;

/// One decoded CDN access log line.
/// Format: IP CACHE LATENCY [timestamp] "METHOD URL PROTOCOL" STATUS BYTES "referer" "user-agent"
/// Example: 112.20.202.37 HIT 0 [01/Jul/2018:00:05:50 +0800] "GET /a.apk HTTP/1.1" 206 66716 "https://fir.im/qiansho" "curl/7.58.0"
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub client_ip: String,
    pub cache_status: String,
    pub response_time_ms: u32,     // Request latency in milliseconds
    pub request_time: DateTime<Tz>, // Wall clock in the parser's local zone, offset suffix ignored
    pub method: String,
    pub url: String,
    pub status_code: i32,
    pub response_size_bytes: u64,
    pub referer: String,    // Still wrapped in double quotes
    pub user_agent: String, // Still wrapped in double quotes
}

impl LogRecord {
    pub fn is_cache_hit(&self) -> bool {
        self.cache_status == "HIT"
    }

    /// Whether the access token embedded in the URL had already expired when
    /// the request was logged. See [`crate::expiry::is_expired`].
    pub fn token_expired(&self) -> Result<bool, crate::error::ExpiryError> {
        crate::expiry::is_expired(self)
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ClientIp: {}", self.client_ip)?;
        writeln!(f, "CacheStatus: {}", self.cache_status)?;
        writeln!(f, "ResponseTimeMs: {}", self.response_time_ms)?;
        writeln!(f, "RequestTime: {}", self.request_time)?;
        writeln!(f, "Method: {}", self.method)?;
        writeln!(f, "Url: {}", self.url)?;
        writeln!(f, "StatusCode: {}", self.status_code)?;
        writeln!(f, "ResponseSizeBytes: {}", self.response_size_bytes)?;
        writeln!(f, "Referer: {}", self.referer)?;
        writeln!(f, "UserAgent: {}", self.user_agent)
    }
}
