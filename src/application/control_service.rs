// Control service - Use case for proxying collector process control and inventory
use crate::application::telemetry_repository::{
    BackendError, CollectorBackend, ControlAction, MachineCategory, ProcessStatus,
};
use serde::Serialize;
use std::sync::Arc;

/// `{success, data?, reason?}` envelope returned to HTTP clients.
#[derive(Debug, Serialize, PartialEq)]
pub struct ApiReply<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl<T> ApiReply<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            reason: Some(reason.into()),
        }
    }
}

impl<T> From<Result<T, BackendError>> for ApiReply<T> {
    fn from(result: Result<T, BackendError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(BackendError::Rejected(reason)) => Self::failed(reason),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct StatusReply {
    pub status: ProcessStatus,
}

#[derive(Clone)]
pub struct ControlService {
    backend: Arc<dyn CollectorBackend>,
}

impl ControlService {
    pub fn new(backend: Arc<dyn CollectorBackend>) -> Self {
        Self { backend }
    }

    pub async fn control(&self, action: &str) -> ApiReply<StatusReply> {
        let Some(action) = ControlAction::parse(action) else {
            return ApiReply::failed(format!("unknown action {action}"));
        };
        let result = self.backend.control(action).await;
        if let Err(e) = &result {
            tracing::warn!("Collector {} failed: {}", action.as_str(), e);
        }
        result.map(|status| StatusReply { status }).into()
    }

    pub async fn machine_list(&self, category: &str) -> ApiReply<Vec<String>> {
        match MachineCategory::parse(category) {
            Some(category) => self.backend.machine_list(category).await.into(),
            None => ApiReply::failed(format!("unknown category {category}")),
        }
    }

    pub async fn db_tables(&self) -> ApiReply<Vec<[String; 3]>> {
        self.backend.db_tables().await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubBackend;

    #[async_trait]
    impl CollectorBackend for StubBackend {
        async fn control(&self, action: ControlAction) -> Result<ProcessStatus, BackendError> {
            match action {
                ControlAction::Status => Ok(ProcessStatus::Stopped),
                ControlAction::Start => Err(BackendError::Rejected("already running".to_string())),
                ControlAction::Stop => Err(BackendError::Transport("connection reset".to_string())),
            }
        }

        async fn get_config(&self, _key: &str) -> Result<String, BackendError> {
            Ok(String::new())
        }

        async fn set_config(&self, _key: &str, _value: &str) -> Result<(), BackendError> {
            Ok(())
        }

        async fn machine_list(&self, category: MachineCategory) -> Result<Vec<String>, BackendError> {
            Ok(vec![format!("{}0", category.as_str())])
        }

        async fn db_tables(&self) -> Result<Vec<[String; 3]>, BackendError> {
            Ok(vec![["MACHBASEDB".to_string(), "SYS".to_string(), "EXAMPLE".to_string()]])
        }
    }

    fn service() -> ControlService {
        ControlService::new(Arc::new(StubBackend))
    }

    #[tokio::test]
    async fn test_status_passes_through() {
        let reply = service().control("status").await;
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            serde_json::json!({"success": true, "data": {"status": "stopped"}})
        );
    }

    #[tokio::test]
    async fn test_failures_become_reasons() {
        assert_eq!(service().control("start").await, ApiReply::failed("already running"));
        assert_eq!(
            service().control("stop").await.reason.as_deref(),
            Some("backend unreachable: connection reset")
        );
        assert!(!service().control("reboot").await.success);
    }

    #[tokio::test]
    async fn test_inventory_lookups() {
        assert_eq!(service().machine_list("net").await, ApiReply::ok(vec!["net0".to_string()]));
        assert!(!service().machine_list("gpu").await.success);
        assert_eq!(service().db_tables().await.data.map(|t| t.len()), Some(1));
    }
}
