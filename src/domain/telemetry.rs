// Telemetry data domain models
use serde::Serialize;

/// Upper bound on rows requested from the store for a single tag.
pub const MAX_ROWS: usize = 1_000_000;

/// One observation as returned by the store, ordered ascending by time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time_ms: i64,
    pub value: Option<f64>,
}

impl Sample {
    pub fn new(time_ms: i64, value: Option<f64>) -> Self {
        Self { time_ms, value }
    }
}

/// Samples for one tag, in the order the store returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSeries {
    pub samples: Vec<Sample>,
}

impl RawSeries {
    pub fn new(mut samples: Vec<Sample>) -> Self {
        samples.truncate(MAX_ROWS);
        Self { samples }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Identifies one time-series query against the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagSeriesRequest {
    pub table_name: String,
    pub tag_name: String,
    pub range_secs: u64,
}

impl TagSeriesRequest {
    pub fn new(table_name: impl Into<String>, tag_name: impl Into<String>, range_secs: u64) -> Self {
        Self {
            table_name: table_name.into(),
            tag_name: tag_name.into(),
            range_secs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    #[default]
    Line,
    Bar,
}

/// A rendered point: `{name: ts, value: [ts, v], symbol: "none"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub name: i64,
    pub value: (i64, Option<f64>),
    pub symbol: &'static str,
}

impl SeriesPoint {
    pub fn new(time_ms: i64, value: Option<f64>) -> Self {
        Self {
            name: time_ms,
            value: (time_ms, value),
            symbol: "none",
        }
    }

    pub fn time_ms(&self) -> i64 {
        self.value.0
    }

    pub fn y(&self) -> Option<f64> {
        self.value.1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Emphasis {
    pub focus: &'static str,
}

/// One chart series, replaced wholesale on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesShape {
    #[serde(rename = "type")]
    pub kind: SeriesKind,
    pub name: String,
    pub smooth: bool,
    pub data: Vec<SeriesPoint>,
    pub emphasis: Emphasis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_axis_index: Option<usize>,
}

impl SeriesShape {
    /// Empty line series carrying only the display name.
    pub fn base(name: impl Into<String>) -> Self {
        Self {
            kind: SeriesKind::Line,
            name: name.into(),
            smooth: true,
            data: Vec::new(),
            emphasis: Emphasis { focus: "series" },
            y_axis_index: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_point_json_layout() {
        let point = SeriesPoint::new(1_700_000_000_000, Some(1.5));
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": 1_700_000_000_000i64, "value": [1_700_000_000_000i64, 1.5], "symbol": "none"})
        );

        let gap = serde_json::to_value(SeriesPoint::new(5, None)).unwrap();
        assert_eq!(gap["value"], serde_json::json!([5, null]));
    }

    #[test]
    fn test_series_shape_json_layout() {
        let mut shape = SeriesShape::base("gc_pause");
        shape.kind = SeriesKind::Bar;
        shape.y_axis_index = Some(1);
        let json = serde_json::to_value(&shape).unwrap();
        assert_eq!(json["type"], "bar");
        assert_eq!(json["yAxisIndex"], 1);
        assert_eq!(json["emphasis"]["focus"], "series");

        let plain = serde_json::to_value(SeriesShape::base("cpu")).unwrap();
        assert!(plain.get("yAxisIndex").is_none());
    }

    #[test]
    fn test_raw_series_is_capped() {
        let samples = (0..(MAX_ROWS as i64 + 3)).map(|t| Sample::new(t, Some(0.0))).collect();
        assert_eq!(RawSeries::new(samples).len(), MAX_ROWS);
    }
}
