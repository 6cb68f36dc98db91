// Series transform engine - raw samples to renderable chart series
use crate::domain::panel::{Aggregator, PanelSpec, TransformOptions};
use crate::domain::telemetry::{Sample, SeriesPoint, SeriesShape};

/// Turn one tag's raw samples into a chart series.
///
/// The output always has exactly one point per input sample, in input order.
/// Values that cannot be computed (first sample of a difference, counter resets,
/// non-positive elapsed time, non-finite results) are emitted as gaps.
pub fn transform(
    index: usize,
    base: SeriesShape,
    samples: &[Sample],
    options: &TransformOptions,
) -> SeriesShape {
    let mut shape = base;
    if let Some(kind) = options.kind {
        shape.kind = kind;
    }
    if let Some(axis) = options.y_axis_index {
        shape.y_axis_index = Some(axis);
    }

    let values = aggregate(samples, options.aggregator);
    shape.data = samples
        .iter()
        .zip(values)
        .map(|(sample, value)| {
            let value = value
                .filter(|v| !(options.clamp_negative && *v < 0.0))
                .map(|v| options.scale.map_or(v, |scale| scale.apply(v)))
                .filter(|v| v.is_finite());
            SeriesPoint::new(sample.time_ms, value)
        })
        .collect();

    tracing::trace!(
        "Series {} ({}) rendered {} points, {} gaps",
        index,
        shape.name,
        shape.data.len(),
        shape.data.iter().filter(|p| p.y().is_none()).count()
    );
    shape
}

/// Apply a panel's configured transform to the samples for tag `index`.
pub fn render_series(panel: &PanelSpec, index: usize, samples: &[Sample]) -> SeriesShape {
    let base = SeriesShape::base(panel.display_name(index));
    match &panel.series_transform {
        Some(custom) => custom.apply(index, base, samples),
        None => transform(index, base, samples, &panel.transform_for(index)),
    }
}

fn aggregate(samples: &[Sample], aggregator: Aggregator) -> Vec<Option<f64>> {
    if aggregator == Aggregator::None {
        return samples.iter().map(|s| s.value).collect();
    }

    let mut out = Vec::with_capacity(samples.len());
    if samples.is_empty() {
        return out;
    }
    out.push(None);
    for pair in samples.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);
        let delta = match (prev.value, cur.value) {
            (Some(p), Some(c)) => Some(c - p),
            _ => None,
        };
        let value = match aggregator {
            Aggregator::Diff => delta,
            Aggregator::DiffNonNegative => delta.filter(|d| *d >= 0.0),
            Aggregator::Rate => {
                let elapsed_ms = cur.time_ms - prev.time_ms;
                delta
                    .filter(|d| *d >= 0.0 && elapsed_ms > 0)
                    .map(|d| d * 1000.0 / elapsed_ms as f64)
            }
            Aggregator::None => cur.value,
        };
        out.push(value);
    }
    out
}
