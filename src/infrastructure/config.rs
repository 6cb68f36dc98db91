// Service configuration loaded from config/glance and GLANCE__* environment variables
use crate::domain::panel::{Aggregator, DataSource, PanelSpec, TransformOptions, ValueScale, YAxisConfig};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub store: EndpointSettings,
    pub backend: EndpointSettings,
    #[serde(default)]
    pub view: ViewSettings,
    #[serde(default)]
    pub panels: Vec<PanelConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub listen: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EndpointSettings {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Bearer token sent with every request, when the endpoint requires one.
    #[serde(default)]
    pub token: Option<String>,
}

impl EndpointSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ViewSettings {
    /// Initial lookback window, e.g. `5m`.
    pub range: String,
    pub refresh_debounce_ms: u64,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            range: "5m".to_string(),
            refresh_debounce_ms: 1000,
        }
    }
}

/// Extra panel declared in the config file, polled alongside the built-in catalog.
#[derive(Debug, Deserialize, Clone)]
pub struct PanelConfig {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    #[serde(default)]
    pub names: Option<Vec<String>>,
    #[serde(default)]
    pub y_axis: Vec<YAxisConfig>,
    #[serde(default)]
    pub aggregator: Aggregator,
    #[serde(default)]
    pub scale: Option<ValueScale>,
    #[serde(default)]
    pub series: Vec<TransformOptions>,
}

impl PanelConfig {
    pub fn to_spec(&self, source: DataSource) -> PanelSpec {
        let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
        let mut spec = PanelSpec::new(self.id.clone(), self.title.clone(), &tags, source);
        spec.display_names = self.names.clone();
        spec.y_axis = self.y_axis.clone();
        spec.value_scale = self.scale;
        spec.transforms = if self.series.is_empty() {
            vec![TransformOptions::with_aggregator(self.aggregator); self.tags.len()]
        } else {
            self.series.clone()
        };
        spec
    }
}

pub fn load_service_config() -> anyhow::Result<ServiceConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/glance").required(false))
        .add_source(config::Environment::with_prefix("GLANCE").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}
