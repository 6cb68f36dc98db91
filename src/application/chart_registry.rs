// Chart panel registry - one managed chart instance per mounted panel
use crate::domain::panel::{PanelSpec, Theme, YAxisConfig};
use crate::domain::telemetry::SeriesShape;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A target that chart instances draw into (a browser element, a snapshot buffer, ...).
pub trait RenderSurface: Send + Sync {
    /// False once the surface has been removed; nothing may be drawn after that.
    fn is_mounted(&self) -> bool;

    /// Allocate a new chart instance on this surface.
    fn init(&self, theme: Theme) -> Box<dyn ChartHandle>;
}

pub trait ChartHandle: Send {
    fn set_option(&mut self, option: &ChartOption);
    fn resize(&mut self, width: u32, height: u32);
    fn dispose(&mut self);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleOption {
    pub text: String,
    pub left: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendOption {
    pub show: bool,
    pub bottom: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridOption {
    pub bottom: &'static str,
    pub top: &'static str,
    pub left: &'static str,
    pub right: &'static str,
    pub contain_label: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XAxisOption {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub min_interval: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisLabel {
    pub formatter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YAxisOption {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub align_ticks: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub axis_label: Option<AxisLabel>,
}

impl From<&YAxisConfig> for YAxisOption {
    fn from(config: &YAxisConfig) -> Self {
        Self {
            kind: "value",
            name: config.name.clone(),
            align_ticks: true,
            axis_label: config.formatter.clone().map(|formatter| AxisLabel { formatter }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TooltipOption {
    pub trigger: &'static str,
}

/// Full option set pushed to a chart instance.
///
/// `series` is sized to the panel's tag count up front and indexed by tag
/// position, so a refresh of one tag never shifts another.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartOption {
    pub title: TitleOption,
    pub legend: LegendOption,
    pub grid: GridOption,
    pub x_axis: XAxisOption,
    pub y_axis: Vec<YAxisOption>,
    pub tooltip: TooltipOption,
    pub series: Vec<Option<SeriesShape>>,
}

impl ChartOption {
    pub fn for_panel(panel: &PanelSpec) -> Self {
        let mut y_axis: Vec<YAxisOption> = panel.y_axis.iter().map(YAxisOption::from).collect();
        if y_axis.is_empty() {
            y_axis.push(YAxisOption::from(&YAxisConfig::default()));
        }

        Self {
            title: TitleOption {
                text: panel.title.clone(),
                left: "center",
            },
            legend: LegendOption {
                show: true,
                bottom: "0px",
            },
            grid: GridOption {
                bottom: "25px",
                top: "35px",
                left: "2px",
                right: "6px",
                contain_label: true,
            },
            x_axis: XAxisOption {
                kind: "time",
                min_interval: 60_000,
            },
            y_axis,
            tooltip: TooltipOption { trigger: "axis" },
            series: vec![None; panel.tags.len()],
        }
    }

    /// Replace the series at `index` wholesale. Out-of-range indices are ignored.
    pub fn set_series(&mut self, index: usize, shape: SeriesShape) -> bool {
        match self.series.get_mut(index) {
            Some(slot) => {
                *slot = Some(shape);
                true
            }
            None => false,
        }
    }
}

/// A live chart on a surface. Every mutation is gated on the liveness flag.
struct ChartInstance {
    handle: Box<dyn ChartHandle>,
    live: bool,
}

impl ChartInstance {
    fn create(surface: &dyn RenderSurface, theme: Theme) -> Self {
        Self {
            handle: surface.init(theme),
            live: true,
        }
    }

    fn set_option(&mut self, option: &ChartOption) {
        if self.live {
            self.handle.set_option(option);
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.live {
            self.handle.resize(width, height);
        }
    }

    fn dispose(&mut self) {
        if self.live {
            self.live = false;
            self.handle.dispose();
        }
    }
}

/// Identifies one mount of a panel. Mounting the same id again yields a new token,
/// so series fetched for an earlier mount never reach the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountToken(u64);

struct PanelSlot {
    token: MountToken,
    surface: Arc<dyn RenderSurface>,
    instance: Option<ChartInstance>,
    template: ChartOption,
    last_option: Option<ChartOption>,
    theme: Theme,
}

impl PanelSlot {
    fn dispose_instance(&mut self) {
        if let Some(mut instance) = self.instance.take() {
            instance.dispose();
        }
    }
}

/// Result of pushing a series into the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Rendered,
    /// The panel is gone, its surface unmounted, or the series belongs to an earlier mount.
    Discarded,
    /// The index does not correspond to one of the panel's tags.
    OutOfRange,
}

#[derive(Default)]
pub struct ChartRegistry {
    slots: Mutex<HashMap<String, PanelSlot>>,
    next_token: AtomicU64,
}

impl ChartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, PanelSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Associate `panel` with `surface`. A chart instance is only allocated once
    /// the first series arrives. Updates must present the returned token.
    pub fn mount(&self, panel: &PanelSpec, surface: Arc<dyn RenderSurface>) -> MountToken {
        let token = MountToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        let slot = PanelSlot {
            token,
            surface,
            instance: None,
            template: ChartOption::for_panel(panel),
            last_option: None,
            theme: panel.source.theme,
        };
        if let Some(mut previous) = self.slots().insert(panel.id.clone(), slot) {
            previous.dispose_instance();
        }
        tracing::info!("Mounted panel {}", panel.id);
        token
    }

    pub fn unmount(&self, panel_id: &str) -> bool {
        match self.slots().remove(panel_id) {
            Some(mut slot) => {
                slot.dispose_instance();
                tracing::info!("Unmounted panel {}", panel_id);
                true
            }
            None => false,
        }
    }

    pub fn apply_series(&self, panel_id: &str, token: MountToken, index: usize, shape: SeriesShape) -> ApplyOutcome {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(panel_id) else {
            tracing::debug!("Discarding series {} for unknown panel {}", index, panel_id);
            return ApplyOutcome::Discarded;
        };
        if slot.token != token {
            tracing::debug!("Discarding series {} from a previous mount of {}", index, panel_id);
            return ApplyOutcome::Discarded;
        }
        if !slot.surface.is_mounted() {
            tracing::debug!("Discarding series {} for unmounted panel {}", index, panel_id);
            slot.dispose_instance();
            return ApplyOutcome::Discarded;
        }

        let option = slot.last_option.get_or_insert_with(|| slot.template.clone());
        if !option.set_series(index, shape) {
            tracing::warn!("Series index {} out of range for panel {}", index, panel_id);
            return ApplyOutcome::OutOfRange;
        }

        let instance = slot.instance.get_or_insert_with(|| {
            tracing::debug!("Creating chart for panel {} ({})", panel_id, slot.theme.as_str());
            ChartInstance::create(slot.surface.as_ref(), slot.theme)
        });
        instance.set_option(option);
        ApplyOutcome::Rendered
    }

    /// Switch theme: the current instance is disposed and a new one renders the
    /// last known option set.
    pub fn set_theme(&self, panel_id: &str, theme: Theme) {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(panel_id) else {
            return;
        };
        if slot.theme == theme {
            return;
        }
        slot.theme = theme;

        let had_instance = slot.instance.is_some();
        slot.dispose_instance();
        if !had_instance || !slot.surface.is_mounted() {
            return;
        }

        let mut instance = ChartInstance::create(slot.surface.as_ref(), theme);
        if let Some(option) = &slot.last_option {
            instance.set_option(option);
        }
        slot.instance = Some(instance);
        tracing::info!("Panel {} switched to {} theme", panel_id, theme.as_str());
    }

    pub fn resize(&self, panel_id: &str, width: u32, height: u32) {
        let mut slots = self.slots();
        if let Some(instance) = slots.get_mut(panel_id).and_then(|s| s.instance.as_mut()) {
            instance.resize(width, height);
        }
    }

    pub fn is_mounted(&self, panel_id: &str) -> bool {
        self.slots()
            .get(panel_id)
            .is_some_and(|slot| slot.surface.is_mounted())
    }

    #[cfg(test)]
    pub fn theme(&self, panel_id: &str) -> Option<Theme> {
        self.slots().get(panel_id).map(|slot| slot.theme)
    }

    /// Last option set pushed to the panel, if any data has arrived yet.
    #[cfg(test)]
    pub fn last_option(&self, panel_id: &str) -> Option<ChartOption> {
        self.slots().get(panel_id).and_then(|slot| slot.last_option.clone())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    pub enum SurfaceEvent {
        Init(Theme),
        SetOption(ChartOption),
        Resize(u32, u32),
        Dispose,
    }

    /// Surface that records every call made against it.
    #[derive(Default)]
    pub struct RecordingSurface {
        unmounted: AtomicBool,
        events: Arc<Mutex<Vec<SurfaceEvent>>>,
    }

    impl RecordingSurface {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn remove(&self) {
            self.unmounted.store(true, Ordering::SeqCst);
        }

        pub fn events(&self) -> Vec<SurfaceEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn count(&self, pred: impl Fn(&SurfaceEvent) -> bool) -> usize {
            self.events().iter().filter(|e| pred(e)).count()
        }

        pub fn last_option(&self) -> Option<ChartOption> {
            self.events().into_iter().rev().find_map(|e| match e {
                SurfaceEvent::SetOption(option) => Some(option),
                _ => None,
            })
        }
    }

    struct RecordingChart(Arc<Mutex<Vec<SurfaceEvent>>>);

    impl ChartHandle for RecordingChart {
        fn set_option(&mut self, option: &ChartOption) {
            self.0.lock().unwrap().push(SurfaceEvent::SetOption(option.clone()));
        }

        fn resize(&mut self, width: u32, height: u32) {
            self.0.lock().unwrap().push(SurfaceEvent::Resize(width, height));
        }

        fn dispose(&mut self) {
            self.0.lock().unwrap().push(SurfaceEvent::Dispose);
        }
    }

    impl RenderSurface for RecordingSurface {
        fn is_mounted(&self) -> bool {
            !self.unmounted.load(Ordering::SeqCst)
        }

        fn init(&self, theme: Theme) -> Box<dyn ChartHandle> {
            self.events.lock().unwrap().push(SurfaceEvent::Init(theme));
            Box::new(RecordingChart(self.events.clone()))
        }
    }
}
