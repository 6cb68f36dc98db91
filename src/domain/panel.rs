// Panel domain model - declarative description of one chart
use super::telemetry::{Sample, SeriesKind, SeriesShape};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    /// Lenient parse used for values read back from the config store.
    pub fn parse(value: &str) -> Option<Theme> {
        match value.trim().to_ascii_lowercase().as_str() {
            "light" | "" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }
}

/// How consecutive samples are combined before plotting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Aggregator {
    /// Plot the stored value as-is.
    #[default]
    None,
    /// First difference `v[i] - v[i-1]`, not normalised by time.
    Diff,
    /// First difference with negative results (counter resets) dropped to a gap.
    #[serde(rename = "diff-nonnegative")]
    DiffNonNegative,
    /// Per-second rate `(v[i] - v[i-1]) * 1000 / (t[i] - t[i-1])`.
    /// Counter resets and non-positive elapsed time become gaps.
    Rate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueScale {
    Divide(f64),
    Multiply(f64),
}

impl ValueScale {
    pub const BYTES_TO_MIB: ValueScale = ValueScale::Divide(1024.0 * 1024.0);
    pub const BYTES_TO_KIB: ValueScale = ValueScale::Divide(1024.0);
    pub const NANOS_TO_MICROS: ValueScale = ValueScale::Divide(1000.0);

    pub fn apply(&self, value: f64) -> f64 {
        match *self {
            ValueScale::Divide(d) => value / d,
            ValueScale::Multiply(m) => value * m,
        }
    }
}

/// Per-series transform settings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    pub aggregator: Aggregator,
    pub scale: Option<ValueScale>,
    /// Drop negative outputs to gaps after aggregation.
    pub clamp_negative: bool,
    pub kind: Option<SeriesKind>,
    pub y_axis_index: Option<usize>,
}

impl TransformOptions {
    pub fn with_aggregator(aggregator: Aggregator) -> Self {
        Self {
            aggregator,
            ..Default::default()
        }
    }

    pub fn scaled(mut self, scale: ValueScale) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn on_axis(mut self, index: usize) -> Self {
        self.y_axis_index = Some(index);
        self
    }

    pub fn as_kind(mut self, kind: SeriesKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn non_negative(mut self) -> Self {
        self.clamp_negative = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YAxisConfig {
    pub name: Option<String>,
    /// Label template such as `{value} MB/s`.
    pub formatter: Option<String>,
}

impl YAxisConfig {
    pub fn new(name: Option<&str>, formatter: Option<&str>) -> Self {
        Self {
            name: name.map(str::to_string),
            formatter: formatter.map(str::to_string),
        }
    }
}

/// Where a panel's data comes from and how often it is refreshed.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub table_name: String,
    pub tag_prefix: String,
    pub range_secs: u64,
    pub refresh_secs: u64,
    pub theme: Theme,
}

type TransformFn = dyn Fn(usize, SeriesShape, &[Sample]) -> SeriesShape + Send + Sync;

/// Caller-supplied replacement for the built-in per-series transform.
#[derive(Clone)]
pub struct CustomTransform(Arc<TransformFn>);

impl CustomTransform {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(usize, SeriesShape, &[Sample]) -> SeriesShape + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(&self, index: usize, base: SeriesShape, samples: &[Sample]) -> SeriesShape {
        (self.0)(index, base, samples)
    }
}

impl fmt::Debug for CustomTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomTransform")
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PanelError {
    #[error("panel {0} has no tags")]
    NoTags(String),
    #[error("panel {id} has {names} display names for {tags} tags")]
    NameCountMismatch { id: String, tags: usize, names: usize },
    #[error("panel {0} has a zero refresh interval")]
    ZeroRefresh(String),
}

#[derive(Debug, Clone)]
pub struct PanelSpec {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub display_names: Option<Vec<String>>,
    pub source: DataSource,
    pub y_axis: Vec<YAxisConfig>,
    /// Per-tag transform settings by index; missing entries use the defaults.
    pub transforms: Vec<TransformOptions>,
    /// Scale applied to every series that has no scale of its own.
    pub value_scale: Option<ValueScale>,
    pub series_transform: Option<CustomTransform>,
}

impl PanelSpec {
    pub fn new(id: impl Into<String>, title: impl Into<String>, tags: &[&str], source: DataSource) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            display_names: None,
            source,
            y_axis: Vec::new(),
            transforms: Vec::new(),
            value_scale: None,
            series_transform: None,
        }
    }

    pub fn names(mut self, names: &[&str]) -> Self {
        self.display_names = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn axis(mut self, axis: YAxisConfig) -> Self {
        self.y_axis.push(axis);
        self
    }

    pub fn transform_all(mut self, options: TransformOptions) -> Self {
        self.transforms = vec![options; self.tags.len()];
        self
    }

    pub fn transforms(mut self, options: Vec<TransformOptions>) -> Self {
        self.transforms = options;
        self
    }

    pub fn validate(&self) -> Result<(), PanelError> {
        if self.tags.is_empty() {
            return Err(PanelError::NoTags(self.id.clone()));
        }
        if let Some(names) = &self.display_names {
            if names.len() != self.tags.len() {
                return Err(PanelError::NameCountMismatch {
                    id: self.id.clone(),
                    tags: self.tags.len(),
                    names: names.len(),
                });
            }
        }
        if self.source.refresh_secs == 0 {
            return Err(PanelError::ZeroRefresh(self.id.clone()));
        }
        Ok(())
    }

    /// Display name for the series at `index`, falling back to the tag.
    pub fn display_name(&self, index: usize) -> &str {
        self.display_names
            .as_ref()
            .and_then(|names| names.get(index))
            .or_else(|| self.tags.get(index))
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Tag names as stored, with the configured prefix applied.
    pub fn query_tags(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|tag| format!("{}{}", self.source.tag_prefix, tag))
            .collect()
    }

    pub fn transform_for(&self, index: usize) -> TransformOptions {
        let mut options = self.transforms.get(index).copied().unwrap_or_default();
        if options.scale.is_none() {
            options.scale = self.value_scale;
        }
        options
    }
}
