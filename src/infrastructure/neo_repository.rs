// Time-series store repository over the HTTP /db/query endpoint
use crate::application::query_builder::TagQuery;
use crate::application::telemetry_repository::{StoreError, TimeSeriesStore};
use crate::domain::telemetry::{RawSeries, Sample, MAX_ROWS};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NeoRepository {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

impl NeoRepository {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn build_query_url(&self, query: &TagQuery) -> String {
        let params: Vec<String> = query
            .params()
            .into_iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(&value)))
            .collect();
        format!("{}/db/query?{}", self.base_url, params.join("&"))
    }
}

#[async_trait]
impl TimeSeriesStore for NeoRepository {
    async fn query_tag(&self, query: &TagQuery) -> Result<RawSeries, StoreError> {
        let url = self.build_query_url(query);
        tracing::debug!("Querying {} tag {}", query.table(), query.tag());

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if !status.is_success() {
            // Failures usually still carry the JSON envelope with a reason.
            if let Ok(envelope) = serde_json::from_str::<QueryResponse>(&body) {
                if let Some(reason) = envelope.reason {
                    return Err(StoreError::Backend(reason));
                }
            }
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_response(&body)
    }
}

fn parse_response(body: &str) -> Result<RawSeries, StoreError> {
    let response: QueryResponse =
        serde_json::from_str(body).map_err(|e| StoreError::Malformed(e.to_string()))?;

    if !response.success {
        return Err(StoreError::Backend(
            response.reason.unwrap_or_else(|| "unknown failure".to_string()),
        ));
    }

    let rows = response.data.map(|d| d.rows).unwrap_or_default();
    let samples = rows
        .iter()
        .take(MAX_ROWS)
        .map(|row| parse_row(row))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RawSeries::new(samples))
}

fn parse_row(row: &[serde_json::Value]) -> Result<Sample, StoreError> {
    let (Some(time), Some(value)) = (row.first(), row.get(1)) else {
        return Err(StoreError::Malformed(format!("expected [time, value], got {} columns", row.len())));
    };

    let time_ms = time
        .as_i64()
        .or_else(|| time.as_f64().map(|t| t as i64))
        .ok_or_else(|| StoreError::Malformed(format!("non-numeric time {}", time)))?;

    let value = match value {
        serde_json::Value::Null => None,
        other => Some(
            other
                .as_f64()
                .ok_or_else(|| StoreError::Malformed(format!("non-numeric value {}", other)))?,
        ),
    };

    Ok(Sample::new(time_ms, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::query_builder::build_tag_query;
    use crate::domain::telemetry::TagSeriesRequest;

    #[test]
    fn test_parse_rows() {
        let body = r#"{"success":true,"reason":"success","data":{"columns":["TIME","VALUE"],"rows":[[1700000000000,1.5],[1700000005000,null],[1700000010000,3]]}}"#;
        let series = parse_response(body).unwrap();
        assert_eq!(
            series.samples,
            vec![
                Sample::new(1_700_000_000_000, Some(1.5)),
                Sample::new(1_700_000_005_000, None),
                Sample::new(1_700_000_010_000, Some(3.0)),
            ]
        );
    }

    #[test]
    fn test_backend_failure_carries_reason() {
        let body = r#"{"success":false,"reason":"Table 'FOO' does not exist."}"#;
        match parse_response(body) {
            Err(StoreError::Backend(reason)) => assert!(reason.contains("FOO")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_and_missing_rows() {
        assert!(parse_response(r#"{"success":true,"data":{"rows":[]}}"#).unwrap().is_empty());
        assert!(parse_response(r#"{"success":true}"#).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_rows_are_rejected() {
        let short = r#"{"success":true,"data":{"rows":[[1700000000000]]}}"#;
        assert!(matches!(parse_response(short), Err(StoreError::Malformed(_))));

        let text = r#"{"success":true,"data":{"rows":[[1700000000000,"high"]]}}"#;
        assert!(matches!(parse_response(text), Err(StoreError::Malformed(_))));

        assert!(matches!(parse_response("<html>"), Err(StoreError::Malformed(_))));
    }

    #[test]
    fn test_build_query_url_encodes_statement() {
        let repo = NeoRepository::new("http://127.0.0.1:5654/".to_string(), Duration::from_secs(1)).unwrap();
        let query = build_tag_query(&TagSeriesRequest::new("EXAMPLE", "load1", 60), 60_000).unwrap();
        let url = repo.build_query_url(&query);

        assert!(url.starts_with("http://127.0.0.1:5654/db/query?q=SELECT%20time%2C%20value"));
        assert!(url.contains("name%20%3D%20%27load1%27"));
        assert!(url.ends_with("&format=json&timeformat=ms"));
    }
}
