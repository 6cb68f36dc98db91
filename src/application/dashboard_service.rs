// Dashboard service - Use case for building, re-ranging and theming the panel set
use crate::application::poll_scheduler::PollScheduler;
use crate::application::telemetry_repository::CollectorBackend;
use crate::domain::dashboard::{split_list, BackendConfig, Dashboard};
use crate::domain::duration::parse_duration;
use crate::domain::panel::{DataSource, Theme};
use crate::infrastructure::config::PanelConfig;
use crate::infrastructure::snapshot_surface::SnapshotSurface;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const DEFAULT_RANGE_SECS: u64 = 300;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ViewError {
    #[error("unusable range {0:?}")]
    InvalidRange(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct PanelSummary {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ViewSummary {
    pub table_name: String,
    pub range_secs: u64,
    pub refresh_secs: u64,
    pub theme: Theme,
    pub panels: usize,
}

struct ViewState {
    config: BackendConfig,
    range_secs: u64,
    surfaces: HashMap<String, Arc<SnapshotSurface>>,
}

pub struct DashboardService {
    scheduler: Arc<PollScheduler>,
    backend: Arc<dyn CollectorBackend>,
    extra_panels: Vec<PanelConfig>,
    view: Mutex<ViewState>,
}

impl DashboardService {
    pub fn new(
        scheduler: Arc<PollScheduler>,
        backend: Arc<dyn CollectorBackend>,
        extra_panels: Vec<PanelConfig>,
        initial_range: &str,
    ) -> Self {
        let range_secs = match parse_duration(initial_range) {
            0 => {
                tracing::warn!("Unusable view range {:?}, using {}s", initial_range, DEFAULT_RANGE_SECS);
                DEFAULT_RANGE_SECS
            }
            secs => secs,
        };
        Self {
            scheduler,
            backend,
            extra_panels,
            view: Mutex::new(ViewState {
                config: BackendConfig::default(),
                range_secs,
                surfaces: HashMap::new(),
            }),
        }
    }

    fn view(&self) -> MutexGuard<'_, ViewState> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn read_key(&self, key: &str) -> Option<String> {
        match self.backend.get_config(key).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Config key {} unavailable, keeping default: {}", key, e);
                None
            }
        }
    }

    /// Read every collector setting, keeping the default for keys that fail or are empty.
    pub async fn load_backend_config(&self) -> BackendConfig {
        let mut config = BackendConfig::default();

        if let Some(table) = self.read_key("table_name").await.filter(|v| !v.trim().is_empty()) {
            config.table_name = table.trim().to_string();
        }
        if let Some(prefix) = self.read_key("tag_prefix").await {
            config.tag_prefix = prefix.trim().to_string();
        }
        if let Some(interval) = self.read_key("interval").await.filter(|v| !v.trim().is_empty()) {
            config.set_interval(&interval);
        }
        if let Some(theme) = self.read_key("theme").await {
            match Theme::parse(&theme) {
                Some(theme) => config.theme = theme,
                None => tracing::warn!("Unknown theme {:?}, keeping {}", theme, config.theme.as_str()),
            }
        }

        config.nets = self.read_key("in_net").await.map(|v| split_list(&v)).unwrap_or_default();
        config.disks = self.read_key("in_disk").await.map(|v| split_list(&v)).unwrap_or_default();
        config.disk_io = self.read_key("in_diskio").await.map(|v| split_list(&v)).unwrap_or_default();
        config.table_rows = self.read_key("in_table_rows").await.map(|v| split_list(&v)).unwrap_or_default();
        config
    }

    /// Re-read the collector settings and rebuild every panel from scratch.
    pub async fn reload(&self) -> ViewSummary {
        let config = self.load_backend_config().await;
        self.rebuild(config)
    }

    fn rebuild(&self, config: BackendConfig) -> ViewSummary {
        self.scheduler.stop_all();

        let mut view = self.view();
        for surface in view.surfaces.values() {
            surface.remove();
        }
        view.surfaces.clear();

        let source = Dashboard::data_source(&config, view.range_secs);
        let extra = self.extra_panels.iter().map(|panel| panel.to_spec(source.clone()));
        for spec in Dashboard::build(&config, view.range_secs).panels.into_iter().chain(extra) {
            let id = spec.id.clone();
            let surface = SnapshotSurface::new();
            match self.scheduler.start_panel(spec, surface.clone()) {
                Ok(()) => {
                    view.surfaces.insert(id, surface);
                }
                Err(e) => tracing::warn!("Skipping panel {}: {}", id, e),
            }
        }

        view.config = config;
        tracing::info!(
            "Dashboard built with {} panels on table {}",
            view.surfaces.len(),
            view.config.table_name
        );
        summarize(&view)
    }

    fn apply_source(&self, source: &DataSource) {
        for id in self.scheduler.panel_ids() {
            self.scheduler.update_source(&id, source.clone());
        }
    }

    /// Change the lookback window for every panel. The refresh period follows
    /// the range tier and each panel fetches again right away.
    pub fn set_range(&self, text: &str) -> Result<ViewSummary, ViewError> {
        let range_secs = parse_duration(text);
        if range_secs == 0 {
            return Err(ViewError::InvalidRange(text.to_string()));
        }

        let mut view = self.view();
        view.range_secs = range_secs;
        self.apply_source(&Dashboard::data_source(&view.config, range_secs));
        tracing::info!("View range set to {}s", range_secs);
        Ok(summarize(&view))
    }

    /// Switch every chart to `theme` and persist the choice on the backend.
    pub async fn set_theme(&self, theme: Theme) -> ViewSummary {
        let summary = {
            let mut view = self.view();
            view.config.theme = theme;
            self.apply_source(&Dashboard::data_source(&view.config, view.range_secs));
            summarize(&view)
        };
        tracing::info!("Theme switched to {}", theme.as_str());

        if let Err(e) = self.backend.set_config("theme", theme.as_str()).await {
            tracing::warn!("Could not persist theme: {}", e);
        }
        summary
    }

    pub fn summary(&self) -> ViewSummary {
        summarize(&self.view())
    }

    pub fn panels(&self) -> Vec<PanelSummary> {
        self.scheduler
            .panel_ids()
            .into_iter()
            .filter_map(|id| self.scheduler.panel(&id))
            .map(|spec| PanelSummary {
                id: spec.id.clone(),
                title: spec.title.clone(),
                tags: spec.query_tags(),
            })
            .collect()
    }

    /// Resize a panel's chart. Returns false for unknown panels.
    pub fn resize(&self, panel_id: &str, width: u32, height: u32) -> bool {
        let registry = self.scheduler.registry();
        if !registry.is_mounted(panel_id) {
            return false;
        }
        registry.resize(panel_id, width, height);
        true
    }

    pub fn surface(&self, panel_id: &str) -> Option<Arc<SnapshotSurface>> {
        self.view().surfaces.get(panel_id).cloned()
    }

    pub fn shutdown(&self) {
        self.scheduler.stop_all();
        for surface in self.view().surfaces.values() {
            surface.remove();
        }
    }
}

fn summarize(view: &ViewState) -> ViewSummary {
    let source = Dashboard::data_source(&view.config, view.range_secs);
    ViewSummary {
        table_name: source.table_name,
        range_secs: source.range_secs,
        refresh_secs: source.refresh_secs,
        theme: source.theme,
        panels: view.surfaces.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::chart_registry::{ChartRegistry, RenderSurface};
    use crate::application::poll_scheduler::SchedulerSettings;
    use crate::application::query_builder::TagQuery;
    use crate::application::telemetry_repository::{
        BackendError, ControlAction, MachineCategory, ProcessStatus, StoreError, TimeSeriesStore,
    };
    use crate::domain::telemetry::RawSeries;
    use async_trait::async_trait;

    struct EmptyStore;

    #[async_trait]
    impl TimeSeriesStore for EmptyStore {
        async fn query_tag(&self, _query: &TagQuery) -> Result<RawSeries, StoreError> {
            Ok(RawSeries::new(Vec::new()))
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        values: HashMap<&'static str, &'static str>,
        saved: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CollectorBackend for FakeBackend {
        async fn control(&self, _action: ControlAction) -> Result<ProcessStatus, BackendError> {
            Ok(ProcessStatus::Running)
        }

        async fn get_config(&self, key: &str) -> Result<String, BackendError> {
            self.values
                .get(key)
                .map(|v| v.to_string())
                .ok_or_else(|| BackendError::Transport("connection refused".to_string()))
        }

        async fn set_config(&self, key: &str, value: &str) -> Result<(), BackendError> {
            self.saved.lock().unwrap().push((key.to_string(), value.to_string()));
            Ok(())
        }

        async fn machine_list(&self, _category: MachineCategory) -> Result<Vec<String>, BackendError> {
            Ok(Vec::new())
        }

        async fn db_tables(&self) -> Result<Vec<[String; 3]>, BackendError> {
            Ok(Vec::new())
        }
    }

    fn service(backend: Arc<FakeBackend>, extra: Vec<PanelConfig>) -> DashboardService {
        let scheduler = Arc::new(PollScheduler::new(
            Arc::new(EmptyStore),
            Arc::new(ChartRegistry::new()),
            SchedulerSettings::default(),
        ));
        DashboardService::new(scheduler, backend, extra, "5m")
    }

    fn backend() -> Arc<FakeBackend> {
        Arc::new(FakeBackend {
            values: HashMap::from([
                ("table_name", "TAG"),
                ("tag_prefix", "node1:"),
                ("interval", "later"),
                ("in_net", "eth0"),
                ("in_disk", ""),
            ]),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_load_backend_config_falls_back_per_key() {
        let service = service(backend(), Vec::new());
        let config = service.load_backend_config().await;

        assert_eq!(config.table_name, "TAG");
        assert_eq!(config.tag_prefix, "node1:");
        assert_eq!(config.interval_secs, 5);
        assert_eq!(config.theme, Theme::Light);
        assert_eq!(config.nets, vec!["eth0".to_string()]);
        assert!(config.disks.is_empty());
        assert!(config.table_rows.is_empty());
    }

    #[tokio::test]
    async fn test_reload_mounts_catalog_and_extra_panels() {
        let extra: PanelConfig = serde_json::from_value(serde_json::json!({
            "id": "ingest",
            "title": "Ingest",
            "tags": ["ingest.rows"],
            "aggregator": "rate"
        }))
        .unwrap();
        let service = service(backend(), vec![extra]);

        let summary = service.reload().await;
        assert_eq!(summary.table_name, "TAG");
        assert_eq!(summary.range_secs, 300);

        let ids: Vec<String> = service.panels().into_iter().map(|p| p.id).collect();
        for id in ["system_load", "nic_bytes_eth0", "ingest"] {
            assert!(ids.contains(&id.to_string()), "missing {id}");
        }
        let procs = service.panels().into_iter().find(|p| p.id == "host_procs").unwrap();
        assert_eq!(procs.tags, vec!["node1:host.procs".to_string()]);

        let old = service.surface("system_load").unwrap();
        service.reload().await;
        assert!(!old.is_mounted());
        assert!(service.surface("system_load").unwrap().is_mounted());
        service.shutdown();
    }

    #[tokio::test]
    async fn test_set_range_retiers_every_panel() {
        let service = service(backend(), Vec::new());
        service.reload().await;

        assert_eq!(service.set_range("soon"), Err(ViewError::InvalidRange("soon".to_string())));

        let summary = service.set_range("1h").unwrap();
        assert_eq!((summary.range_secs, summary.refresh_secs), (3600, 60));
        let scheduler = &service.scheduler;
        for id in scheduler.panel_ids() {
            let source = &scheduler.panel(&id).unwrap().source;
            assert_eq!((source.range_secs, source.refresh_secs), (3600, 60));
        }
        service.shutdown();
    }

    #[tokio::test]
    async fn test_set_theme_updates_panels_and_persists() {
        let backend = backend();
        let service = service(backend.clone(), Vec::new());
        service.reload().await;

        let summary = service.set_theme(Theme::Dark).await;
        assert_eq!(summary.theme, Theme::Dark);
        assert_eq!(service.scheduler.registry().theme("cpu_mem"), Some(Theme::Dark));
        assert_eq!(
            *backend.saved.lock().unwrap(),
            vec![("theme".to_string(), "dark".to_string())]
        );
        service.shutdown();
    }
}
