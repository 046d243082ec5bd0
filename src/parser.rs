use crate::error::{DecodeError, SchemaError};
use crate::models::LogRecord;
use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use regex::Regex;
use tracing::trace;

// Format:
// IP CACHE LATENCY [timestamp] "METHOD URL HTTP/version" status bytes "referer" "user-agent"
// Each named group must have an entry in FIELDS below, checked in LogParser::new.
// Digit and space classes are ASCII only; `\d`/`\s` would also match Unicode digits and spaces.
const LINE_PATTERN: &str = r#"^(?P<client_ip>[0-9]+\.[0-9]+\.[0-9]+\.[0-9]+)[ \t]+(?P<cache_status>HIT|MISS|UNKNOWN|-)[ \t]+(?P<response_time_ms>[0-9]+)[ \t]+(?P<request_time>\[[^\]]+\])[ \t]+"(?P<method>GET|HEAD|POST|OPTIONS)[ \t]+(?P<url>.+)[ \t]+HTTPs?/(?:1\.0|1\.1|2\.0)"[ \t]+(?P<status_code>[0-9]+)[ \t]+(?P<response_size_bytes>[0-9]+)[ \t]+(?P<referer>".*")[ \t]+(?P<user_agent>".*")(?-u:\s)*$"#;

const REQUEST_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S";

type FieldSetter = fn(&mut RecordDraft, &str, &Tz) -> Result<(), DecodeError>;

/// Capture group name -> setter. Order is irrelevant.
const FIELDS: &[(&str, FieldSetter)] = &[
    ("client_ip", set_client_ip),
    ("cache_status", set_cache_status),
    ("response_time_ms", set_response_time_ms),
    ("request_time", set_request_time),
    ("method", set_method),
    ("url", set_url),
    ("status_code", set_status_code),
    ("response_size_bytes", set_response_size_bytes),
    ("referer", set_referer),
    ("user_agent", set_user_agent),
];

/// Decoder for CDN access log lines.
///
/// The pattern is compiled once in [`LogParser::new`]; build one parser at
/// startup and share it by reference. It holds no mutable state, so a single
/// instance can be used from many threads at once.
pub struct LogParser {
    line_regex: Regex,
    fields: Vec<(usize, FieldSetter)>,
    local_tz: Tz,
}

impl LogParser {
    /// `local_tz` is the zone request times are interpreted in. The offset
    /// written in the log line itself is discarded.
    pub fn new(local_tz: Tz) -> Result<Self, SchemaError> {
        Self::with_pattern(LINE_PATTERN, FIELDS, local_tz)
    }

    fn with_pattern(
        pattern: &str,
        table: &[(&str, FieldSetter)],
        local_tz: Tz,
    ) -> Result<Self, SchemaError> {
        let line_regex = Regex::new(pattern)?;

        for name in line_regex.capture_names().flatten() {
            if !table.iter().any(|(field, _)| *field == name) {
                return Err(SchemaError::Drift {
                    field: name.to_string(),
                    reason: "is captured by the pattern but has no setter",
                });
            }
        }

        let mut fields = Vec::with_capacity(table.len());
        for &(field, setter) in table {
            let index = line_regex
                .capture_names()
                .position(|name| name == Some(field))
                .ok_or_else(|| SchemaError::Drift {
                    field: field.to_string(),
                    reason: "has a setter but is not captured by the pattern",
                })?;
            fields.push((index, setter));
        }

        Ok(Self {
            line_regex,
            fields,
            local_tz,
        })
    }

    pub fn local_tz(&self) -> Tz {
        self.local_tz
    }

    /// Decode one line. Either every field is filled or an error naming the
    /// line is returned.
    pub fn decode(&self, line: &str) -> Result<LogRecord, DecodeError> {
        let captures = self
            .line_regex
            .captures(line)
            .ok_or_else(|| mismatch(line))?;

        let mut draft = RecordDraft::default();
        for &(index, setter) in &self.fields {
            let value = captures.get(index).ok_or_else(|| mismatch(line))?.as_str();
            setter(&mut draft, value, &self.local_tz)?;
        }

        let record = draft.finish().ok_or_else(|| mismatch(line))?;
        trace!(client_ip = %record.client_ip, url = %record.url, "decoded line");
        Ok(record)
    }

    /// Alias of [`LogParser::decode`], matching the other line parsers.
    pub fn parse_line(&self, line: &str) -> Result<LogRecord, DecodeError> {
        self.decode(line)
    }
}

fn mismatch(line: &str) -> DecodeError {
    DecodeError::Mismatch {
        line: line.to_string(),
    }
}

/// Parse `[01/Jul/2018:00:05:50 +0800]` as a wall clock in `local_tz`.
/// Only the part before the first space is read.
pub(crate) fn parse_request_time(token: &str, local_tz: &Tz) -> Result<DateTime<Tz>, DecodeError> {
    let wall_clock = token
        .split([' ', '\t'])
        .next()
        .unwrap_or_default()
        .trim_start_matches('[');

    // chrono's %d and %S also take `1/Jul` and leap second `60`
    if !has_fixed_layout(wall_clock) {
        return Err(DecodeError::TimeLayout {
            token: token.to_string(),
        });
    }

    let naive_dt = NaiveDateTime::parse_from_str(wall_clock, REQUEST_TIME_FORMAT).map_err(
        |source| DecodeError::Time {
            token: token.to_string(),
            source,
        },
    )?;

    // Ambiguous times (DST fold) take the earlier instant
    local_tz
        .from_local_datetime(&naive_dt)
        .earliest()
        .ok_or_else(|| DecodeError::NonexistentLocalTime {
            token: token.to_string(),
        })
}

/// `DD/Mon/YYYY:HH:MM:SS`, every numeric part zero padded, seconds below 60.
fn has_fixed_layout(wall_clock: &str) -> bool {
    const LAYOUT: &[u8] = b"00/Mon/0000:00:00:00";

    let bytes = wall_clock.as_bytes();
    if bytes.len() != LAYOUT.len() {
        return false;
    }

    let shape_ok = bytes.iter().zip(LAYOUT).all(|(&b, &l)| match l {
        b'0' => b.is_ascii_digit(),
        b'M' | b'o' | b'n' => b.is_ascii_alphabetic(),
        _ => b == l,
    });

    shape_ok && bytes[18] <= b'5'
}

fn parse_number<T>(field: &'static str, value: &str) -> Result<T, DecodeError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    value.parse::<T>().map_err(|source| DecodeError::InvalidNumber {
        field,
        value: value.to_string(),
        source,
    })
}

#[derive(Default)]
struct RecordDraft {
    client_ip: Option<String>,
    cache_status: Option<String>,
    response_time_ms: Option<u32>,
    request_time: Option<DateTime<Tz>>,
    method: Option<String>,
    url: Option<String>,
    status_code: Option<i32>,
    response_size_bytes: Option<u64>,
    referer: Option<String>,
    user_agent: Option<String>,
}

impl RecordDraft {
    fn finish(self) -> Option<LogRecord> {
        Some(LogRecord {
            client_ip: self.client_ip?,
            cache_status: self.cache_status?,
            response_time_ms: self.response_time_ms?,
            request_time: self.request_time?,
            method: self.method?,
            url: self.url?,
            status_code: self.status_code?,
            response_size_bytes: self.response_size_bytes?,
            referer: self.referer?,
            user_agent: self.user_agent?,
        })
    }
}

fn set_client_ip(draft: &mut RecordDraft, value: &str, _: &Tz) -> Result<(), DecodeError> {
    draft.client_ip = Some(value.to_string());
    Ok(())
}

fn set_cache_status(draft: &mut RecordDraft, value: &str, _: &Tz) -> Result<(), DecodeError> {
    draft.cache_status = Some(value.to_string());
    Ok(())
}

fn set_response_time_ms(draft: &mut RecordDraft, value: &str, _: &Tz) -> Result<(), DecodeError> {
    draft.response_time_ms = Some(parse_number("response_time_ms", value)?);
    Ok(())
}

fn set_request_time(draft: &mut RecordDraft, value: &str, tz: &Tz) -> Result<(), DecodeError> {
    draft.request_time = Some(parse_request_time(value, tz)?);
    Ok(())
}

fn set_method(draft: &mut RecordDraft, value: &str, _: &Tz) -> Result<(), DecodeError> {
    draft.method = Some(value.to_string());
    Ok(())
}

fn set_url(draft: &mut RecordDraft, value: &str, _: &Tz) -> Result<(), DecodeError> {
    draft.url = Some(value.to_string());
    Ok(())
}

fn set_status_code(draft: &mut RecordDraft, value: &str, _: &Tz) -> Result<(), DecodeError> {
    draft.status_code = Some(parse_number("status_code", value)?);
    Ok(())
}

fn set_response_size_bytes(draft: &mut RecordDraft, value: &str, _: &Tz) -> Result<(), DecodeError> {
    draft.response_size_bytes = Some(parse_number("response_size_bytes", value)?);
    Ok(())
}

fn set_referer(draft: &mut RecordDraft, value: &str, _: &Tz) -> Result<(), DecodeError> {
    draft.referer = Some(value.to_string());
    Ok(())
}

fn set_user_agent(draft: &mut RecordDraft, value: &str, _: &Tz) -> Result<(), DecodeError> {
    draft.user_agent = Some(value.to_string());
    Ok(())
}
