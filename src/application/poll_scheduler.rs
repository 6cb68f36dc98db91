// Poll scheduler - periodic per-panel refresh of every tag
use crate::application::chart_registry::{ApplyOutcome, ChartRegistry, MountToken, RenderSurface};
use crate::application::query_builder::build_tag_query_now;
use crate::application::telemetry_repository::TimeSeriesStore;
use crate::application::transform::render_series;
use crate::domain::panel::{DataSource, PanelError, PanelSpec};
use crate::domain::telemetry::TagSeriesRequest;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    /// Upper bound on a single store request.
    pub request_timeout: Duration,
    /// Minimum gap between the end of one immediate fetch and the next.
    pub debounce: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            debounce: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Timer,
    Immediate,
}

/// Request sequencing for one (panel, tag) pair.
#[derive(Default)]
struct TagFence {
    issued: AtomicU64,
    in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fetch state for one mounted panel.
pub struct PanelPoller {
    spec: RwLock<Arc<PanelSpec>>,
    mount: MountToken,
    fences: Vec<TagFence>,
    last_immediate: Mutex<Option<Instant>>,
    store: Arc<dyn TimeSeriesStore>,
    registry: Arc<ChartRegistry>,
    settings: SchedulerSettings,
}

impl PanelPoller {
    fn new(
        spec: PanelSpec,
        mount: MountToken,
        store: Arc<dyn TimeSeriesStore>,
        registry: Arc<ChartRegistry>,
        settings: SchedulerSettings,
    ) -> Self {
        let fences = spec.tags.iter().map(|_| TagFence::default()).collect();
        Self {
            spec: RwLock::new(Arc::new(spec)),
            mount,
            fences,
            last_immediate: Mutex::new(None),
            store,
            registry,
            settings,
        }
    }

    pub fn spec(&self) -> Arc<PanelSpec> {
        self.spec.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_source(&self, source: DataSource) {
        let mut guard = self.spec.write().unwrap_or_else(PoisonError::into_inner);
        let mut spec = PanelSpec::clone(&guard);
        spec.source = source;
        *guard = Arc::new(spec);
    }

    /// Issue one request per tag. Timer cycles skip tags whose previous request
    /// is still outstanding; immediate cycles always issue.
    fn fire(self: &Arc<Self>, trigger: Trigger) -> Vec<JoinHandle<()>> {
        let spec = self.spec();
        let mut handles = Vec::with_capacity(self.fences.len());

        for (index, tag) in spec.query_tags().into_iter().enumerate() {
            let fence = &self.fences[index];
            if trigger == Trigger::Timer && fence.in_flight.load(Ordering::SeqCst) > 0 {
                tracing::debug!("Panel {} tag {} still in flight, skipping tick", spec.id, tag);
                continue;
            }
            let seq = fence.issued.fetch_add(1, Ordering::SeqCst) + 1;
            fence.in_flight.fetch_add(1, Ordering::SeqCst);

            let poller = Arc::clone(self);
            let spec = Arc::clone(&spec);
            handles.push(tokio::spawn(async move {
                poller.fetch_tag(&spec, index, tag, seq).await;
            }));
        }
        handles
    }

    async fn fetch_tag(&self, spec: &PanelSpec, index: usize, tag: String, seq: u64) {
        let fence = &self.fences[index];
        let _in_flight = InFlight(&fence.in_flight);

        let request = TagSeriesRequest::new(&spec.source.table_name, &tag, spec.source.range_secs);
        let query = match build_tag_query_now(&request) {
            Ok(query) => query,
            Err(e) => {
                tracing::warn!("Panel {} cannot query tag {}: {}", spec.id, tag, e);
                return;
            }
        };

        let series = match tokio::time::timeout(self.settings.request_timeout, self.store.query_tag(&query)).await {
            Ok(Ok(series)) => series,
            Ok(Err(e)) => {
                tracing::warn!("Failed chart {} tag {}: {}", spec.id, tag, e);
                return;
            }
            Err(_) => {
                tracing::warn!(
                    "Chart {} tag {} timed out after {:?}",
                    spec.id,
                    tag,
                    self.settings.request_timeout
                );
                return;
            }
        };

        if series.is_empty() {
            tracing::debug!("Chart {} tag {} returned no rows", spec.id, tag);
            return;
        }
        let latest = fence.issued.load(Ordering::SeqCst);
        if seq < latest {
            tracing::debug!("Dropping stale response #{} for {} tag {} (latest #{})", seq, spec.id, tag, latest);
            return;
        }

        let shape = render_series(spec, index, &series.samples);
        if self.registry.apply_series(&spec.id, self.mount, index, shape) == ApplyOutcome::Rendered {
            tracing::debug!("Chart {} tag {} updated with {} rows", spec.id, tag, series.len());
        }
    }

    /// Fetch every tag now unless the previous immediate fetch finished within
    /// the debounce window. Returns whether a fetch was started.
    fn refresh_now(self: &Arc<Self>) -> bool {
        let recently = self
            .last_immediate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|done| done.elapsed() < self.settings.debounce);
        if recently {
            tracing::debug!("Immediate refresh of {} debounced", self.spec().id);
            return false;
        }

        let handles = self.fire(Trigger::Immediate);
        let poller = Arc::clone(self);
        tokio::spawn(async move {
            futures::future::join_all(handles).await;
            *poller.last_immediate.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        });
        true
    }
}

async fn run_timer(poller: Arc<PanelPoller>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        poller.fire(Trigger::Timer);
    }
}

struct PanelHandle {
    poller: Arc<PanelPoller>,
    timer: JoinHandle<()>,
}

impl PanelHandle {
    fn restart_timer(&mut self) {
        self.timer.abort();
        let period = Duration::from_secs(self.poller.spec().source.refresh_secs);
        self.timer = tokio::spawn(run_timer(Arc::clone(&self.poller), period));
    }
}

/// Owns one independent refresh timer per mounted panel.
pub struct PollScheduler {
    store: Arc<dyn TimeSeriesStore>,
    registry: Arc<ChartRegistry>,
    settings: SchedulerSettings,
    panels: Mutex<HashMap<String, PanelHandle>>,
}

impl PollScheduler {
    pub fn new(store: Arc<dyn TimeSeriesStore>, registry: Arc<ChartRegistry>, settings: SchedulerSettings) -> Self {
        Self {
            store,
            registry,
            settings,
            panels: Mutex::new(HashMap::new()),
        }
    }

    fn panels(&self) -> std::sync::MutexGuard<'_, HashMap<String, PanelHandle>> {
        self.panels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn registry(&self) -> &Arc<ChartRegistry> {
        &self.registry
    }

    /// Mount `spec` on `surface`, fetch it once and start its refresh timer.
    pub fn start_panel(&self, spec: PanelSpec, surface: Arc<dyn RenderSurface>) -> Result<(), PanelError> {
        spec.validate()?;
        let id = spec.id.clone();
        let period = Duration::from_secs(spec.source.refresh_secs);

        self.stop_panel(&id);
        let mount = self.registry.mount(&spec, surface);

        let poller = Arc::new(PanelPoller::new(
            spec,
            mount,
            self.store.clone(),
            self.registry.clone(),
            self.settings,
        ));
        poller.refresh_now();
        let timer = tokio::spawn(run_timer(Arc::clone(&poller), period));

        tracing::info!("Polling panel {} every {:?}", id, period);
        self.panels().insert(id, PanelHandle { poller, timer });
        Ok(())
    }

    /// Stop polling and dispose the panel's chart. Responses still in flight are
    /// discarded by the registry when they arrive, even if the id is mounted again.
    pub fn stop_panel(&self, panel_id: &str) -> bool {
        let Some(handle) = self.panels().remove(panel_id) else {
            return false;
        };
        handle.timer.abort();
        self.registry.unmount(panel_id);
        true
    }

    pub fn stop_all(&self) {
        let ids: Vec<String> = self.panels().keys().cloned().collect();
        for id in ids {
            self.stop_panel(&id);
        }
    }

    /// Apply new inputs to a panel: theme switches go to the registry, a new
    /// refresh period restarts the timer, and a new table, prefix or range
    /// triggers a debounced immediate fetch.
    pub fn update_source(&self, panel_id: &str, source: DataSource) -> bool {
        let mut panels = self.panels();
        let Some(handle) = panels.get_mut(panel_id) else {
            return false;
        };
        let previous = handle.poller.spec().source.clone();
        if previous == source || source.refresh_secs == 0 {
            return false;
        }
        handle.poller.set_source(source.clone());

        if previous.theme != source.theme {
            self.registry.set_theme(panel_id, source.theme);
        }
        if previous.refresh_secs != source.refresh_secs {
            handle.restart_timer();
        }
        if previous.table_name != source.table_name
            || previous.tag_prefix != source.tag_prefix
            || previous.range_secs != source.range_secs
        {
            handle.poller.refresh_now();
        }
        true
    }

    pub fn refresh_now(&self, panel_id: &str) -> bool {
        self.panels()
            .get(panel_id)
            .is_some_and(|handle| handle.poller.refresh_now())
    }

    pub fn panel_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.panels().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn panel(&self, panel_id: &str) -> Option<Arc<PanelSpec>> {
        self.panels().get(panel_id).map(|handle| handle.poller.spec())
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        for handle in self.panels.get_mut().unwrap_or_else(PoisonError::into_inner).values() {
            handle.timer.abort();
        }
    }
}
