//! The seam between result streams and the API.
//!
//! A [`ResultSource`] answers two questions for a stream: is the job done,
//! and what results exist past these offsets. Responses are parsed here as a
//! whole before the stream mutates any state.

use super::metric_id::MetricId;
use super::types::DataPoint;
use crate::errors::CoreError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Offsets to ask results after, one per tracked metric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultQuery {
    entries: Vec<(String, i64)>,
}

impl ResultQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: &MetricId, offset: i64) {
        self.entries.push((id.to_string(), offset));
    }

    pub fn with(mut self, id: &MetricId, offset: i64) -> Self {
        self.push(id, offset);
        self
    }

    pub fn entries(&self) -> &[(String, i64)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value of the `ids` query parameter: `id|offset` pairs joined by `,`.
    pub fn to_param(&self) -> String {
        self.entries
            .iter()
            .map(|(id, offset)| format!("{}|{}", id, offset))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Job whose results can be streamed.
#[async_trait]
pub trait ResultSource: Send + Sync {
    /// Whether the job reached a terminal status. Queries the API.
    async fn is_done(&self) -> Result<bool, CoreError>;

    /// Fetch results past the offsets in `query`, as raw JSON.
    async fn fetch_results(&self, query: &ResultQuery) -> Result<Value, CoreError>;

    /// Name used in logs and handler callbacks.
    fn label(&self) -> String {
        "results".to_string()
    }
}

#[async_trait]
impl<S: ResultSource + ?Sized> ResultSource for Arc<S> {
    async fn is_done(&self) -> Result<bool, CoreError> {
        (**self).is_done().await
    }

    async fn fetch_results(&self, query: &ResultQuery) -> Result<Value, CoreError> {
        (**self).fetch_results(query).await
    }

    fn label(&self) -> String {
        (**self).label()
    }
}

/// Parsed response: new points per metric id, oldest first.
pub type ResultBatches = BTreeMap<String, Vec<DataPoint>>;

/// Parse a results response.
///
/// Two shapes are accepted:
/// - object form `{"<id>": [{offset, timestamp, data}, ...]}`
/// - list form `[{"id": "<id>", "offset": n, "data": [...]}, ...]`, where
///   every element of `data` becomes a point at the batch offset unless it
///   carries its own
///
/// Metrics with a missing or empty list, or a point without an integer
/// offset, are left out. Any other top-level shape is a protocol error.
pub fn parse_results(response: &Value) -> Result<ResultBatches, CoreError> {
    match response {
        Value::Object(map) => Ok(parse_object_form(map)),
        Value::Array(items) => Ok(parse_list_form(items)),
        other => Err(CoreError::protocol(format!(
            "expected results object or list, got {}",
            json_kind(other)
        ))),
    }
}

fn parse_object_form(map: &Map<String, Value>) -> ResultBatches {
    let mut batches = ResultBatches::new();
    for (id, points) in map {
        let Some(points) = points.as_array() else {
            debug!(metric = %id, "skipping metric: points are not a list");
            continue;
        };
        match points.iter().map(parse_point).collect::<Option<Vec<_>>>() {
            Some(parsed) if !parsed.is_empty() => {
                batches.insert(id.clone(), parsed);
            }
            Some(_) => {}
            None => debug!(metric = %id, "skipping metric: point without offset"),
        }
    }
    batches
}

fn parse_list_form(items: &[Value]) -> ResultBatches {
    let mut batches = ResultBatches::new();
    for item in items {
        let Some(id) = item.get("id").and_then(Value::as_str) else {
            debug!("skipping result object without id");
            continue;
        };
        let batch_offset = item.get("offset").and_then(Value::as_i64);
        let Some(data) = item.get("data").and_then(Value::as_array) else {
            debug!(metric = %id, "skipping metric: data is not a list");
            continue;
        };

        let mut points = Vec::with_capacity(data.len());
        let mut complete = true;
        for sample in data {
            let offset = sample
                .get("offset")
                .and_then(Value::as_i64)
                .or(batch_offset);
            match offset {
                Some(offset) => points.push(DataPoint {
                    offset,
                    timestamp: sample.get("timestamp").cloned(),
                    data: sample.clone(),
                }),
                None => {
                    complete = false;
                    break;
                }
            }
        }

        if !complete {
            debug!(metric = %id, "skipping metric: point without offset");
            continue;
        }
        if !points.is_empty() {
            batches.entry(id.to_string()).or_default().extend(points);
        }
    }
    batches
}

fn parse_point(point: &Value) -> Option<DataPoint> {
    let offset = point.get("offset")?.as_i64()?;
    Some(DataPoint {
        offset,
        timestamp: point.get("timestamp").cloned(),
        data: point.get("data").cloned().unwrap_or(Value::Null),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_param() {
        let a: MetricId = "__li_user_load_time:1".parse().unwrap();
        let b: MetricId = "__li_clients_active:1".parse().unwrap();
        let query = ResultQuery::new().with(&a, -1).with(&b, 7);
        assert_eq!(
            query.to_param(),
            "__li_user_load_time:1|-1,__li_clients_active:1|7"
        );
        assert_eq!(ResultQuery::new().to_param(), "");
    }

    #[test]
    fn test_object_form() {
        let batches = parse_results(&json!({
            "m1": [
                {"offset": 1, "timestamp": 100, "data": {"value": 1.0}},
                {"offset": 2, "timestamp": 200, "data": {"value": 2.0}}
            ]
        }))
        .unwrap();
        let points = &batches["m1"];
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].offset, 2);
        assert_eq!(points[1].timestamp, Some(json!(200)));
        assert_eq!(points[1].data, json!({"value": 2.0}));
    }

    #[test]
    fn test_malformed_metrics_skipped() {
        let batches = parse_results(&json!({
            "empty": [],
            "not_list": {"offset": 1},
            "no_offset": [{"offset": 1}, {"data": 3}],
            "string_offset": [{"offset": "3"}],
            "ok": [{"offset": 5, "data": 1}]
        }))
        .unwrap();
        assert_eq!(batches.keys().collect::<Vec<_>>(), vec!["ok"]);
    }

    #[test]
    fn test_list_form() {
        let batches = parse_results(&json!([
            {"id": "m1", "offset": 4, "data": [{"timestamp": 1, "value": 3}, {"timestamp": 2, "value": 4}]},
            {"id": "m2", "offset": 9, "data": []},
            {"offset": 1, "data": [{"value": 0}]},
            {"id": "m3", "data": [{"value": 0}]}
        ]))
        .unwrap();
        assert_eq!(batches.keys().collect::<Vec<_>>(), vec!["m1"]);
        let points = &batches["m1"];
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.offset == 4));
        assert_eq!(points[0].timestamp, Some(json!(1)));
    }

    #[test]
    fn test_top_level_malformed() {
        for bad in [json!("nope"), json!(null), json!(3)] {
            assert!(matches!(parse_results(&bad), Err(CoreError::Protocol(_))));
        }
    }
}
