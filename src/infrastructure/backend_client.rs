// Collector backend REST client - process control, config store, host inventory
use crate::application::telemetry_repository::{
    BackendError, CollectorBackend, ControlAction, MachineCategory, ProcessStatus,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Envelope every backend endpoint answers with.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self) -> Result<T, BackendError> {
        if !self.success {
            return Err(BackendError::Rejected(
                self.reason.unwrap_or_else(|| "unknown failure".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| BackendError::Malformed("response has no data".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct StatusData {
    status: ProcessStatus,
}

#[derive(Debug, Deserialize)]
struct TableRows {
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: String, token: Option<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<ApiEnvelope<T>, BackendError> {
        let response = self
            .authorize(request)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        // Error statuses still carry the envelope, so the body is decoded either way.
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| {
            BackendError::Malformed(format!("status {}: {}", status.as_u16(), e))
        })
    }
}

#[async_trait]
impl CollectorBackend for BackendClient {
    async fn control(&self, action: ControlAction) -> Result<ProcessStatus, BackendError> {
        let envelope: ApiEnvelope<StatusData> = self
            .send(self.client.get(self.url(&format!("control/{}", action.as_str()))))
            .await?;
        Ok(envelope.into_data()?.status)
    }

    async fn get_config(&self, key: &str) -> Result<String, BackendError> {
        let envelope: ApiEnvelope<HashMap<String, String>> = self
            .send(self.client.get(self.url(&format!("configs/{}", urlencoding::encode(key)))))
            .await?;
        let mut data = envelope.into_data()?;
        Ok(data.remove(&key.to_lowercase()).unwrap_or_default())
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let body = HashMap::from([(key.to_string(), value.to_string())]);
        let envelope: ApiEnvelope<serde_json::Value> = self
            .send(self.client.post(self.url("configs")).json(&body))
            .await?;
        if envelope.success {
            Ok(())
        } else {
            Err(BackendError::Rejected(envelope.reason.unwrap_or_default()))
        }
    }

    async fn machine_list(&self, category: MachineCategory) -> Result<Vec<String>, BackendError> {
        let envelope: ApiEnvelope<HashMap<String, Vec<String>>> = self
            .send(self.client.get(self.url(&format!("machine/{}", category.as_str()))))
            .await?;
        let mut data = envelope.into_data()?;
        Ok(data.remove(category.as_str()).unwrap_or_default())
    }

    async fn db_tables(&self) -> Result<Vec<[String; 3]>, BackendError> {
        let envelope: ApiEnvelope<TableRows> = self.send(self.client.get(self.url("db/tables"))).await?;
        Ok(table_triples(envelope.into_data()?.rows))
    }
}

fn table_triples(rows: Vec<Vec<serde_json::Value>>) -> Vec<[String; 3]> {
    rows.into_iter()
        .filter_map(|row| {
            let text = |idx: usize| row.get(idx).and_then(|v| v.as_str()).map(str::to_string);
            Some([text(0)?, text(1)?, text(2)?])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_rejection_keeps_reason() {
        let envelope: ApiEnvelope<StatusData> =
            serde_json::from_str(r#"{"success":false,"reason":"process already running"}"#).unwrap();
        match envelope.into_data() {
            Err(BackendError::Rejected(reason)) => assert_eq!(reason, "process already running"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_status_envelope() {
        let envelope: ApiEnvelope<StatusData> =
            serde_json::from_str(r#"{"success":true,"reason":"success","data":{"status":"running"}}"#).unwrap();
        assert_eq!(envelope.into_data().unwrap().status, ProcessStatus::Running);

        let odd: ApiEnvelope<StatusData> =
            serde_json::from_str(r#"{"success":true,"data":{"status":"starting"}}"#).unwrap();
        assert_eq!(odd.into_data().unwrap().status, ProcessStatus::Unknown);
    }

    #[test]
    fn test_table_triples_skip_short_rows() {
        let rows = vec![
            vec![
                serde_json::json!("MACHBASEDB"),
                serde_json::json!("SYS"),
                serde_json::json!("EXAMPLE"),
                serde_json::json!(6),
            ],
            vec![serde_json::json!("MACHBASEDB")],
        ];
        assert_eq!(
            table_triples(rows),
            vec![["MACHBASEDB".to_string(), "SYS".to_string(), "EXAMPLE".to_string()]]
        );
    }

    #[test]
    fn test_url_layout() {
        let client = BackendClient::new("http://host/web/apps/neo-cat/".to_string(), None, Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("control/status"), "http://host/web/apps/neo-cat/api/control/status");
    }
}
