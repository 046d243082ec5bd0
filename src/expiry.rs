use crate::error::ExpiryError;
use crate::models::LogRecord;
use chrono::{DateTime, Utc};
use url::Url;

/// Query parameter carrying the token deadline as Unix epoch seconds.
pub const EXPIRY_PARAM: &str = "e";

// Request paths without scheme/host are resolved against this placeholder
const RELATIVE_BASE: &str = "http://localhost/";

/// Check whether the access token in `record.url` had expired at
/// `record.request_time`.
///
/// A URL without an `e` parameter (or with an empty one) never expires.
/// Otherwise the token is expired when its deadline is strictly before the
/// request time.
pub fn is_expired(record: &LogRecord) -> Result<bool, ExpiryError> {
    let url = parse_url(&record.url).map_err(|source| ExpiryError::Url {
        url: record.url.clone(),
        source,
    })?;

    let query = url.query().unwrap_or_default();
    validate_query(query).map_err(|reason| ExpiryError::Query {
        query: query.to_string(),
        reason,
        url: record.url.clone(),
    })?;

    let value = match url.query_pairs().find(|(key, _)| key == EXPIRY_PARAM) {
        Some((_, value)) if !value.is_empty() => value,
        _ => return Ok(false),
    };

    let seconds = value
        .parse::<i64>()
        .map_err(|source| ExpiryError::InvalidExpiry {
            value: value.to_string(),
            url: record.url.clone(),
            source,
        })?;

    let expires_at =
        DateTime::<Utc>::from_timestamp(seconds, 0).ok_or_else(|| ExpiryError::ExpiryOutOfRange {
            seconds,
            url: record.url.clone(),
        })?;

    Ok(expires_at < record.request_time.with_timezone(&Utc))
}

fn parse_url(raw: &str) -> Result<Url, url::ParseError> {
    match Url::parse(raw) {
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(RELATIVE_BASE)?.join(raw),
        other => other,
    }
}

/// Reject the query forms a strict form decoder refuses: `;` separators and
/// `%` not followed by two hex digits.
fn validate_query(query: &str) -> Result<(), String> {
    let bytes = query.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b';' => return Err("invalid semicolon separator in query".to_string()),
            b'%' => {
                let escape = bytes.get(i + 1..i + 3);
                if !escape.is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit)) {
                    let end = (i + 3).min(query.len());
                    let shown = String::from_utf8_lossy(&bytes[i..end]);
                    return Err(format!("invalid URL escape {:?}", shown));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::Tz;

    fn record_at(url: &str, tz: Tz, naive: chrono::NaiveDateTime) -> LogRecord {
        LogRecord {
            client_ip: "222.172.134.143".to_string(),
            cache_status: "HIT".to_string(),
            response_time_ms: 3878,
            request_time: tz.from_local_datetime(&naive).earliest().unwrap(),
            method: "GET".to_string(),
            url: url.to_string(),
            status_code: 200,
            response_size_bytes: 1365604,
            referer: "\"https://fir.im/aucr\"".to_string(),
            user_agent: "\"Mozilla/5.0 (Linux; U; Android 6.0.1; zh-cn; OPPO R9s Build/MMB29M)\"".to_string(),
        }
    }

    fn record(url: &str) -> LogRecord {
        let naive = NaiveDate::from_ymd_opt(2018, 8, 3)
            .unwrap()
            .and_hms_opt(14, 33, 42)
            .unwrap();
        record_at(url, chrono_tz::Asia::Shanghai, naive)
    }

    #[test]
    fn test_token_expired_before_request() {
        let entry = record("https://pro-app-qn.fir.im/de6c6da598066b501aa2543bb7407e0f5adbe749.apk?attname=huayu_an.weima3d.     com_201805152219.apk_1.0.apk&e=1532414273&token=LOvmia8oXF4xnLh0IdH05XMYpH6ENHNpARlmPc-T:oNtZGTqGu4Wg5lRImrDysMt_bDk=");

        assert!(is_expired(&entry).unwrap());
        assert!(entry.token_expired().unwrap());
    }

    #[test]
    fn test_token_still_valid() {
        let entry = record("https://pro-app-qn.fir.im/a.apk?e=1600000000&token=abc");
        assert!(!is_expired(&entry).unwrap());
    }

    #[test]
    fn test_deadline_equal_to_request_time_is_not_expired() {
        let naive = DateTime::<Utc>::from_timestamp(1533278022, 0).unwrap().naive_utc();
        let entry = record_at("/a.apk?e=1533278022", chrono_tz::UTC, naive);
        assert!(!is_expired(&entry).unwrap());

        let entry = record_at("/a.apk?e=1533278021", chrono_tz::UTC, naive);
        assert!(is_expired(&entry).unwrap());
    }

    #[test]
    fn test_missing_or_empty_parameter_never_expires() {
        assert!(!is_expired(&record("https://cdn.example.com/a.apk?token=abc")).unwrap());
        assert!(!is_expired(&record("https://cdn.example.com/a.apk")).unwrap());
        assert!(!is_expired(&record("https://cdn.example.com/a.apk?e=&token=abc")).unwrap());
        // Only the exact name counts
        assert!(!is_expired(&record("https://cdn.example.com/a.apk?expires=1")).unwrap());
    }

    #[test]
    fn test_relative_request_path() {
        assert!(is_expired(&record("/a.apk?attname=x.apk&e=1532414273")).unwrap());
    }

    #[test]
    fn test_first_parameter_wins() {
        assert!(is_expired(&record("/a.apk?e=1532414273&e=abc")).unwrap());
    }

    #[test]
    fn test_invalid_expiry_value() {
        match is_expired(&record("/a.apk?e=tomorrow")) {
            Err(ExpiryError::InvalidExpiry { value, url, .. }) => {
                assert_eq!(value, "tomorrow");
                assert_eq!(url, "/a.apk?e=tomorrow");
            }
            other => panic!("expected invalid expiry, got {:?}", other),
        }
    }

    #[test]
    fn test_expiry_out_of_range() {
        assert!(matches!(
            is_expired(&record("/a.apk?e=9223372036854775807")),
            Err(ExpiryError::ExpiryOutOfRange { seconds: i64::MAX, .. })
        ));
    }

    #[test]
    fn test_malformed_query() {
        match is_expired(&record("/a.apk?e=1&name=%zz")) {
            Err(ExpiryError::Query { query, reason, .. }) => {
                assert_eq!(query, "e=1&name=%zz");
                assert!(reason.contains("%zz"));
            }
            other => panic!("expected query error, got {:?}", other),
        }

        assert!(matches!(
            is_expired(&record("/a.apk?e=1;token=abc")),
            Err(ExpiryError::Query { .. })
        ));
        assert!(matches!(
            is_expired(&record("/a.apk?e=1&x=%4")),
            Err(ExpiryError::Query { .. })
        ));
    }

    #[test]
    fn test_malformed_url() {
        match is_expired(&record("http://[::1/a.apk?e=1")) {
            Err(ExpiryError::Url { url, .. }) => assert_eq!(url, "http://[::1/a.apk?e=1"),
            other => panic!("expected url error, got {:?}", other),
        }
    }
}
