// In-memory render surface: keeps the latest rendered chart for HTTP readers
use crate::application::chart_registry::{ChartHandle, ChartOption, RenderSurface};
use crate::domain::panel::Theme;
use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

const UPDATE_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Serialize)]
struct RenderedChart<'a> {
    theme: Theme,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<SurfaceSize>,
    option: &'a ChartOption,
}

struct SnapshotState {
    mounted: AtomicBool,
    latest: Mutex<Option<Bytes>>,
    updates: broadcast::Sender<Bytes>,
}

impl SnapshotState {
    fn publish(&self, frame: Bytes) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame.clone());
        // No subscribers is fine; readers can still fetch the latest frame.
        let _ = self.updates.send(frame);
    }
}

/// Surface whose "drawing" is a serialized JSON frame of the chart option.
#[derive(Clone)]
pub struct SnapshotSurface {
    state: Arc<SnapshotState>,
}

impl Default for SnapshotSurface {
    fn default() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        Self {
            state: Arc::new(SnapshotState {
                mounted: AtomicBool::new(true),
                latest: Mutex::new(None),
                updates,
            }),
        }
    }
}

impl SnapshotSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark the surface as gone. Instances on it stop drawing.
    pub fn remove(&self) {
        self.state.mounted.store(false, Ordering::SeqCst);
    }

    /// Most recent frame, as JSON.
    pub fn latest(&self) -> Option<Bytes> {
        self.state.latest.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.state.updates.subscribe()
    }
}

impl RenderSurface for SnapshotSurface {
    fn is_mounted(&self) -> bool {
        self.state.mounted.load(Ordering::SeqCst)
    }

    fn init(&self, theme: Theme) -> Box<dyn ChartHandle> {
        Box::new(SnapshotChart {
            state: Arc::clone(&self.state),
            theme,
            size: None,
            last: None,
            disposed: false,
        })
    }
}

struct SnapshotChart {
    state: Arc<SnapshotState>,
    theme: Theme,
    size: Option<SurfaceSize>,
    last: Option<ChartOption>,
    disposed: bool,
}

impl SnapshotChart {
    fn render(&self, option: &ChartOption) {
        if self.disposed || !self.state.mounted.load(Ordering::SeqCst) {
            return;
        }
        let frame = RenderedChart {
            theme: self.theme,
            size: self.size,
            option,
        };
        match serde_json::to_vec(&frame) {
            Ok(json) => self.state.publish(Bytes::from(json)),
            Err(e) => tracing::error!("Failed to serialize chart frame: {}", e),
        }
    }
}

impl ChartHandle for SnapshotChart {
    fn set_option(&mut self, option: &ChartOption) {
        self.render(option);
        self.last = Some(option.clone());
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = Some(SurfaceSize { width, height });
        if let Some(option) = &self.last {
            self.render(option);
        }
    }

    fn dispose(&mut self) {
        self.disposed = true;
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::panel::{DataSource, PanelSpec};

    fn option() -> ChartOption {
        let source = DataSource {
            table_name: "EXAMPLE".to_string(),
            tag_prefix: String::new(),
            range_secs: 60,
            refresh_secs: 5,
            theme: Theme::Dark,
        };
        ChartOption::for_panel(&PanelSpec::new("p", "Panel", &["a"], source))
    }

    fn frame(bytes: &Bytes) -> serde_json::Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_frames_are_published_to_subscribers() {
        let surface = SnapshotSurface::new();
        let mut updates = surface.subscribe();
        let mut chart = surface.init(Theme::Dark);

        chart.set_option(&option());
        let published = updates.recv().await.unwrap();
        assert_eq!(frame(&published)["theme"], "dark");
        assert_eq!(frame(&published)["option"]["title"]["text"], "Panel");
        assert_eq!(surface.latest(), Some(published));
    }

    #[test]
    fn test_resize_republishes_with_size() {
        let surface = SnapshotSurface::new();
        let mut chart = surface.init(Theme::Light);
        chart.resize(10, 10);
        assert!(surface.latest().is_none());

        chart.set_option(&option());
        chart.resize(400, 250);
        let latest = frame(&surface.latest().unwrap());
        assert_eq!(latest["size"], serde_json::json!({"width": 400, "height": 250}));
    }

    #[test]
    fn test_disposed_or_removed_chart_stops_drawing() {
        let surface = SnapshotSurface::new();
        let mut chart = surface.init(Theme::Light);
        chart.dispose();
        chart.set_option(&option());
        assert!(surface.latest().is_none());

        let mut fresh = surface.init(Theme::Light);
        surface.remove();
        fresh.set_option(&option());
        assert!(surface.latest().is_none());
        assert!(!surface.is_mounted());
    }
}
