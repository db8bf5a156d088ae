use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Timestamp layout of the Common Log Format.
pub const CLF_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Layout of a rendered access line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Common Log Format plus quoted referer/user-agent and duration in ms.
    #[default]
    Combined,
    /// Classic Common Log Format.
    Common,
    /// One JSON object per line.
    Json,
}

/// A single answered request.
///
/// Built once when the request completes and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessEvent {
    pub remote_addr: String,
    pub time: DateTime<FixedOffset>,
    pub method: String,
    pub request_uri: String,
    pub proto: String,
    pub status: u16,
    /// Declared request length, -1 when unknown.
    pub content_length: i64,
    pub referer: String,
    pub user_agent: String,
    pub duration: Duration,
    /// Response body bytes written through the observing writer.
    pub bytes_written: u64,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    remote_addr: &'a str,
    time: String,
    method: &'a str,
    uri: &'a str,
    proto: &'a str,
    status: u16,
    content_length: i64,
    bytes_written: u64,
    referer: &'a str,
    user_agent: &'a str,
    duration_ms: f64,
}

impl AccessEvent {
    /// Completion timestamp in the local zone.
    pub fn now() -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }

    pub fn duration_ms(&self) -> u128 {
        self.duration.as_millis()
    }

    /// Render one log line in the given layout.
    pub fn format(&self, format: LogFormat) -> String {
        match format {
            LogFormat::Combined => format!(
                "{} - - [{}] \"{} {} {}\" {} {} \"{}\" \"{}\" {}ms",
                self.remote_addr,
                self.time.format(CLF_TIME_FORMAT),
                self.method,
                self.request_uri,
                self.proto,
                self.status,
                self.content_length,
                self.referer,
                self.user_agent,
                self.duration_ms(),
            ),
            LogFormat::Common => format!(
                "{} - - [{}] \"{} {} {}\" {} {}",
                self.remote_addr,
                self.time.format(CLF_TIME_FORMAT),
                self.method,
                self.request_uri,
                self.proto,
                self.status,
                self.content_length,
            ),
            LogFormat::Json => {
                let line = JsonLine {
                    remote_addr: &self.remote_addr,
                    time: self.time.to_rfc3339(),
                    method: &self.method,
                    uri: &self.request_uri,
                    proto: &self.proto,
                    status: self.status,
                    content_length: self.content_length,
                    bytes_written: self.bytes_written,
                    referer: &self.referer,
                    user_agent: &self.user_agent,
                    duration_ms: self.duration.as_secs_f64() * 1000.0,
                };
                serde_json::to_string(&line).unwrap_or_default()
            }
        }
    }
}

impl fmt::Display for AccessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(LogFormat::Combined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> AccessEvent {
        let tz = FixedOffset::west_opt(7 * 3600).unwrap();
        AccessEvent {
            remote_addr: "10.0.0.7".into(),
            time: tz.with_ymd_and_hms(2000, 10, 10, 13, 55, 36).unwrap(),
            method: "GET".into(),
            request_uri: "/apache_pb.gif?x=1".into(),
            proto: "HTTP/1.0".into(),
            status: 200,
            content_length: 2326,
            referer: "http://www.example.com/start.html".into(),
            user_agent: "Mozilla/4.08".into(),
            duration: Duration::from_micros(12_900),
            bytes_written: 42,
        }
    }

    #[test]
    fn combined_line_matches_extended_clf() {
        assert_eq!(
            sample().format(LogFormat::Combined),
            "10.0.0.7 - - [10/Oct/2000:13:55:36 -0700] \"GET /apache_pb.gif?x=1 HTTP/1.0\" 200 2326 \
             \"http://www.example.com/start.html\" \"Mozilla/4.08\" 12ms"
        );
    }

    #[test]
    fn display_is_combined() {
        let ev = sample();
        assert_eq!(ev.to_string(), ev.format(LogFormat::Combined));
    }

    #[test]
    fn common_line_omits_agent_and_duration() {
        let line = sample().format(LogFormat::Common);
        assert_eq!(
            line,
            "10.0.0.7 - - [10/Oct/2000:13:55:36 -0700] \"GET /apache_pb.gif?x=1 HTTP/1.0\" 200 2326"
        );
    }

    #[test]
    fn unknown_length_renders_negative() {
        let mut ev = sample();
        ev.content_length = -1;
        assert!(ev.format(LogFormat::Common).ends_with(" 200 -1"));
    }

    #[test]
    fn json_line_carries_all_fields() {
        let v: serde_json::Value =
            serde_json::from_str(&sample().format(LogFormat::Json)).unwrap();
        assert_eq!(v["remote_addr"], "10.0.0.7");
        assert_eq!(v["status"], 200);
        assert_eq!(v["bytes_written"], 42);
        assert_eq!(v["user_agent"], "Mozilla/4.08");
        assert_eq!(v["time"], "2000-10-10T13:55:36-07:00");
        assert!((v["duration_ms"].as_f64().unwrap() - 12.9).abs() < 1e-9);
    }

    #[test]
    fn duration_is_truncated_to_millis() {
        let mut ev = sample();
        ev.duration = Duration::from_micros(999);
        assert!(ev.to_string().ends_with(" 0ms"));
    }

    #[test]
    fn log_format_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&LogFormat::Json).unwrap(), "\"json\"");
        let f: LogFormat = serde_json::from_str("\"common\"").unwrap();
        assert_eq!(f, LogFormat::Common);
        assert_eq!(LogFormat::default(), LogFormat::Combined);
    }
}
