// Repository traits for the time-series store and the collector backend
use crate::application::query_builder::TagQuery;
use crate::domain::telemetry::RawSeries;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Why a store request produced no data.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Transport(String),
    #[error("store answered with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("store reported failure: {0}")]
    Backend(String),
    #[error("malformed store response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Fetch `(time, value)` rows for one tag, ordered as the store returns them.
    async fn query_tag(&self, query: &TagQuery) -> Result<RawSeries, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("backend rejected request: {0}")]
    Rejected(String),
    #[error("unexpected backend response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Stop,
    Status,
}

impl ControlAction {
    pub fn parse(value: &str) -> Option<ControlAction> {
        match value {
            "start" => Some(ControlAction::Start),
            "stop" => Some(ControlAction::Stop),
            "status" => Some(ControlAction::Status),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
            ControlAction::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Running,
    Stopped,
    #[serde(other)]
    Unknown,
}

/// Device categories the backend can enumerate for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineCategory {
    Protocol,
    Partition,
    DiskIo,
    Net,
}

impl MachineCategory {
    pub fn parse(value: &str) -> Option<MachineCategory> {
        match value {
            "protocol" => Some(MachineCategory::Protocol),
            "partition" => Some(MachineCategory::Partition),
            "diskio" => Some(MachineCategory::DiskIo),
            "net" => Some(MachineCategory::Net),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MachineCategory::Protocol => "protocol",
            MachineCategory::Partition => "partition",
            MachineCategory::DiskIo => "diskio",
            MachineCategory::Net => "net",
        }
    }
}

/// The collector backend's REST API: process control and the key-value config store.
#[async_trait]
pub trait CollectorBackend: Send + Sync {
    async fn control(&self, action: ControlAction) -> Result<ProcessStatus, BackendError>;

    /// Value stored under `key`; an unset key reads as an empty string.
    async fn get_config(&self, key: &str) -> Result<String, BackendError>;

    async fn set_config(&self, key: &str, value: &str) -> Result<(), BackendError>;

    async fn machine_list(&self, category: MachineCategory) -> Result<Vec<String>, BackendError>;

    /// `[database, user, table]` triples available for row counters.
    async fn db_tables(&self) -> Result<Vec<[String; 3]>, BackendError>;
}
