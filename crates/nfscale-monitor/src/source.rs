//! Metric source capability and its HTTP implementation.
//!
//! Wire contract of the metric store:
//!
//! ```text
//! GET /entries/{count}[?initial_sequency={cursor}]
//! → [ { "entries": [ { "cpu_usage": "12.5" }, ... ], "count": 3, "_id": "..." }, ... ]
//! ```
//!
//! The store is not trusted: every record is checked for shape, a positive
//! count, finite CPU values and an id before it becomes a [`MetricSample`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use nfscale_core::{Cursor, HttpClient, MetricSample};
use serde_json::Value;
use tracing::{Instrument, Span, debug, info_span};
use url::form_urlencoded;

use crate::error::{MonitorError, MonitorResult};

/// Boxed future returned by [`MetricSource::fetch`].
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = MonitorResult<Vec<MetricSample>>> + Send + 'a>>;

/// Append-only stream of aggregated CPU samples.
pub trait MetricSource: Send + Sync {
    /// Fetch up to `count` samples, oldest first.
    ///
    /// With a cursor, only samples after it; without one, the most recent
    /// `count` samples.
    fn fetch<'a>(&'a self, count: usize, cursor: Option<&'a Cursor>) -> FetchFuture<'a>;
}

/// Metric source backed by the metric store's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpMetricSource {
    client: HttpClient,
    span: Span,
}

impl HttpMetricSource {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        let client = HttpClient::new(addr, timeout);
        let span = info_span!("monitor", addr = %client.addr());
        Self { client, span }
    }

    async fn fetch_inner(
        &self,
        count: usize,
        cursor: Option<&Cursor>,
    ) -> MonitorResult<Vec<MetricSample>> {
        let path = match cursor {
            Some(c) => {
                let cursor: String = form_urlencoded::byte_serialize(c.as_str().as_bytes()).collect();
                format!("/entries/{count}?initial_sequency={cursor}")
            }
            None => format!("/entries/{count}"),
        };
        let resp = self.client.get(&path).await?;
        if !resp.is_success() {
            return Err(MonitorError::Status {
                status: resp.status.as_u16(),
                body: resp.text(),
            });
        }
        let value: Value = resp
            .json()
            .map_err(|e| MonitorError::Malformed(format!("invalid JSON: {e}")))?;
        let samples = parse_samples(&value)?;
        debug!(requested = count, received = samples.len(), cursor = ?cursor, "fetched samples");
        Ok(samples)
    }
}

impl MetricSource for HttpMetricSource {
    fn fetch<'a>(&'a self, count: usize, cursor: Option<&'a Cursor>) -> FetchFuture<'a> {
        Box::pin(self.fetch_inner(count, cursor).instrument(self.span.clone()))
    }
}

/// Validate and convert a metric store response body.
pub fn parse_samples(value: &Value) -> MonitorResult<Vec<MetricSample>> {
    let records = value
        .as_array()
        .ok_or_else(|| MonitorError::Malformed("expected a JSON array".to_string()))?;
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            parse_record(record)
                .map_err(|e| MonitorError::Malformed(format!("record {i}: {e}")))
        })
        .collect()
}

fn parse_record(record: &Value) -> Result<MetricSample, String> {
    let obj = record.as_object().ok_or("expected an object")?;

    let count = obj
        .get("count")
        .and_then(Value::as_u64)
        .ok_or("missing or non-integer `count`")?;
    if count == 0 {
        return Err("`count` must be positive".to_string());
    }

    let cursor = match obj.get("_id") {
        Some(Value::String(s)) => Cursor::new(s.clone()),
        Some(Value::Number(n)) => Cursor::new(n.to_string()),
        _ => return Err("missing `_id`".to_string()),
    };

    let entries = obj
        .get("entries")
        .and_then(Value::as_array)
        .ok_or("missing `entries` array")?;
    let mut aggregate_cpu = 0.0;
    for (j, entry) in entries.iter().enumerate() {
        aggregate_cpu += parse_cpu(entry).ok_or_else(|| format!("entry {j}: bad `cpu_usage`"))?;
    }

    Ok(MetricSample {
        aggregate_cpu,
        sample_count: count,
        cursor,
    })
}

/// `cpu_usage` arrives as a numeric string, occasionally as a number.
fn parse_cpu(entry: &Value) -> Option<f64> {
    let v = match entry.get("cpu_usage")? {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfscale_core::http::testing;
    use serde_json::json;

    #[test]
    fn parses_string_and_numeric_cpu() {
        let value = json!([
            { "entries": [{ "cpu_usage": "10.5" }, { "cpu_usage": 19.5 }], "count": 2, "_id": "a1" },
            { "entries": [{ "cpu_usage": "90" }], "count": 1, "_id": "a2" }
        ]);
        let samples = parse_samples(&value).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].aggregate_cpu, 30.0);
        assert_eq!(samples[0].mean_cpu(), 15.0);
        assert_eq!(samples[1].cursor.as_str(), "a2");
    }

    #[test]
    fn rejects_non_array() {
        let err = parse_samples(&json!({ "entries": [] })).unwrap_err();
        assert!(matches!(err, MonitorError::Malformed(_)));
    }

    #[test]
    fn rejects_zero_count() {
        let value = json!([{ "entries": [], "count": 0, "_id": "a" }]);
        assert!(matches!(parse_samples(&value), Err(MonitorError::Malformed(m)) if m.contains("positive")));
    }

    #[test]
    fn rejects_unparseable_cpu() {
        let value = json!([{ "entries": [{ "cpu_usage": "n/a" }], "count": 1, "_id": "a" }]);
        assert!(matches!(parse_samples(&value), Err(MonitorError::Malformed(_))));
    }

    #[test]
    fn rejects_missing_id() {
        let value = json!([{ "entries": [{ "cpu_usage": "1" }], "count": 1 }]);
        assert!(matches!(parse_samples(&value), Err(MonitorError::Malformed(m)) if m.contains("_id")));
    }

    #[tokio::test]
    async fn http_fetch_with_and_without_cursor() {
        let body = json!([{ "entries": [{ "cpu_usage": "42" }], "count": 1, "_id": "s9" }]).to_string();
        let (addr, mut rx) = testing::serve(vec![(200, body.clone()), (200, body)]).await;
        let source = HttpMetricSource::new(addr, Duration::from_secs(2));

        let samples = source.fetch(10, None).await.unwrap();
        assert_eq!(samples[0].mean_cpu(), 42.0);
        let first = rx.recv().await.unwrap();
        assert!(first.request_line.starts_with("GET /entries/10 "));

        let cursor = Cursor::new("s9");
        source.fetch(10, Some(&cursor)).await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(second
            .request_line
            .starts_with("GET /entries/10?initial_sequency=s9 "));
    }

    #[tokio::test]
    async fn cursor_is_percent_encoded() {
        let body = json!([{ "entries": [{ "cpu_usage": "1" }], "count": 1, "_id": "x" }]).to_string();
        let (addr, mut rx) = testing::serve(vec![(200, body)]).await;
        let source = HttpMetricSource::new(addr, Duration::from_secs(2));

        let cursor = Cursor::new("65f0/a1&b c");
        source.fetch(5, Some(&cursor)).await.unwrap();
        let captured = rx.recv().await.unwrap();
        assert!(captured
            .request_line
            .starts_with("GET /entries/5?initial_sequency=65f0%2Fa1%26b+c "));
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let (addr, _rx) = testing::serve(vec![(503, "down".to_string())]).await;
        let source = HttpMetricSource::new(addr, Duration::from_secs(2));
        let err = source.fetch(10, None).await.unwrap_err();
        assert!(matches!(err, MonitorError::Status { status: 503, .. }));
    }
}
