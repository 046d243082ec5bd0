use crate::error::{DecodeError, ExpiryError};
use crate::models::LogRecord;
use crate::size::SizeAccumulator;
use serde::Serialize;
use std::collections::BTreeMap;

/// Totals over a stream of decoded lines.
///
/// Each worker owns one `Summary`; combine them with [`Summary::merge`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub lines_read: u64,
    pub records_decoded: u64,
    pub lines_rejected: u64,
    pub total_size: SizeAccumulator,
    pub cache_status_counts: BTreeMap<String, u64>,
    pub tokens_expired: u64,
    pub tokens_valid: u64,
    pub expiry_errors: u64,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one decode result. Returns the expiry error, if any, so the
    /// caller can log it; the record's size is counted either way.
    pub fn observe(
        &mut self,
        decoded: &Result<LogRecord, DecodeError>,
    ) -> Result<(), ExpiryError> {
        match decoded {
            Ok(record) => self.add_record(record),
            Err(_) => {
                self.lines_read += 1;
                self.lines_rejected += 1;
                Ok(())
            }
        }
    }

    pub fn add_record(&mut self, record: &LogRecord) -> Result<(), ExpiryError> {
        self.lines_read += 1;
        self.records_decoded += 1;
        self.total_size.add(record.response_size_bytes);
        *self
            .cache_status_counts
            .entry(record.cache_status.clone())
            .or_insert(0) += 1;

        match record.token_expired() {
            Ok(true) => self.tokens_expired += 1,
            Ok(false) => self.tokens_valid += 1,
            Err(e) => {
                self.expiry_errors += 1;
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn merge(&mut self, other: &Summary) {
        self.lines_read += other.lines_read;
        self.records_decoded += other.records_decoded;
        self.lines_rejected += other.lines_rejected;
        self.total_size.merge(&other.total_size);
        for (status, count) in &other.cache_status_counts {
            *self.cache_status_counts.entry(status.clone()).or_insert(0) += count;
        }
        self.tokens_expired += other.tokens_expired;
        self.tokens_valid += other.tokens_valid;
        self.expiry_errors += other.expiry_errors;
    }
}

/// Per-file summary as emitted in the JSON report.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub path: String,
    #[serde(flatten)]
    pub summary: Summary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub generated_at: String,
    pub timezone: String,
    pub files: Vec<FileSummary>,
    pub total: Summary,
}

impl SummaryReport {
    pub fn new(timezone: String, files: Vec<FileSummary>) -> Self {
        let mut total = Summary::new();
        for file in &files {
            total.merge(&file.summary);
        }

        Self {
            generated_at: crate::output::current_timestamp(),
            timezone,
            files,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::LogParser;

    const LINES: [&str; 4] = [
        r#"112.20.202.37 HIT 0 [01/Jul/2018:00:05:50 +0800] "GET /a.apk?e=1529742356&token=x HTTP/1.1" 206 66716 "https://fir.im/qiansho" "curl/7.58.0""#,
        r#"112.20.202.38 MISS 12 [01/Jul/2018:00:05:51 +0800] "GET /b.apk HTTP/1.1" 200 1048576 "-" "curl/7.58.0""#,
        r#"not an access log line"#,
        r#"112.20.202.39 HIT 4 [01/Jul/2018:00:05:52 +0800] "GET /c.apk?e=soon HTTP/1.1" 200 1024 "-" "curl/7.58.0""#,
    ];

    fn summarize(parser: &LogParser, lines: &[&str]) -> (Summary, usize) {
        let mut summary = Summary::new();
        let mut expiry_failures = 0;
        for line in lines {
            if summary.observe(&parser.decode(line)).is_err() {
                expiry_failures += 1;
            }
        }
        (summary, expiry_failures)
    }

    #[test]
    fn test_observe_counts_every_outcome() {
        let parser = LogParser::new(chrono_tz::Asia::Shanghai).unwrap();

        let (summary, expiry_failures) = summarize(&parser, &LINES);

        assert_eq!(summary.lines_read, 4);
        assert_eq!(summary.records_decoded, 3);
        assert_eq!(summary.lines_rejected, 1);
        assert_eq!(summary.tokens_expired, 1);
        assert_eq!(summary.tokens_valid, 1);
        assert_eq!(summary.expiry_errors, 1);
        assert_eq!(expiry_failures, 1);
        assert_eq!(summary.cache_status_counts.get("HIT"), Some(&2));
        assert_eq!(summary.cache_status_counts.get("MISS"), Some(&1));
        // 66716 + 1048576 + 1024
        assert_eq!(summary.total_size.to_string(), "1MB 66KB 156Bytes");
    }

    #[test]
    fn test_merge_equals_sequential() {
        let parser = LogParser::new(chrono_tz::UTC).unwrap();

        let (whole, _) = summarize(&parser, &LINES);
        let (mut left, _) = summarize(&parser, &LINES[..2]);
        let (right, _) = summarize(&parser, &LINES[2..]);
        left.merge(&right);

        assert_eq!(left.lines_read, whole.lines_read);
        assert_eq!(left.lines_rejected, whole.lines_rejected);
        assert_eq!(left.total_size, whole.total_size);
        assert_eq!(left.cache_status_counts, whole.cache_status_counts);
        assert_eq!(left.tokens_expired, whole.tokens_expired);
        assert_eq!(left.expiry_errors, whole.expiry_errors);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let parser = LogParser::new(chrono_tz::UTC).unwrap();
        let (summary, _) = summarize(&parser, &LINES[..2]);

        let report = SummaryReport::new(
            "UTC".to_string(),
            vec![FileSummary {
                path: "access.log".to_string(),
                summary,
            }],
        );
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["timezone"], "UTC");
        assert_eq!(json["files"][0]["path"], "access.log");
        assert_eq!(json["files"][0]["recordsDecoded"], 2);
        assert_eq!(json["total"]["totalSize"], "1MB 65KB 156Bytes");
        assert_eq!(json["total"]["cacheStatusCounts"]["MISS"], 1);
        assert!(json["generatedAt"].is_string());
    }
}
