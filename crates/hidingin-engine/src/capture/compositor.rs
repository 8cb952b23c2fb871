use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::events::{COMPOSITE_PUBLISHED, EventHub, EventParams, EventValue};
use crate::time::CyclePacer;

use super::latest::LatestFrame;
use super::{
    CaptureArgs, CaptureError, CaptureFrameDesc, CaptureSource, CompositeCaptureArgs, FrameBatch,
    FrameSink, Layer, LayerMerger, OrderKey, PublishedFrame,
};

const COMPOSITOR_THREAD: &str = "hidingin-compositor";

/// Lifecycle of the compositor thread.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum CompositorState {
    Idle = 0,
    Collecting = 1,
    Composing = 2,
    Published = 3,
    Stopped = 4,
}

impl CompositorState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => CompositorState::Idle,
            1 => CompositorState::Collecting,
            2 => CompositorState::Composing,
            3 => CompositorState::Published,
            _ => CompositorState::Stopped,
        }
    }
}

/// Coarse status for hosts that only care whether capture is live.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CaptureStatus {
    NotStarted,
    Running,
    Stopped,
}

struct Slots {
    /// Batch currently being filled by sources.
    pending: FrameBatch,
    /// Full batch waiting for the compositor.
    ready: Option<FrameBatch>,
}

/// State shared between the owner, the sinks and the compositor thread.
pub(crate) struct Shared {
    args: CompositeCaptureArgs,
    slots: Mutex<Slots>,
    batch_ready: Condvar,
    state: AtomicU8,
    stop: AtomicBool,
    /// Keys `0..registered` are valid.
    registered: AtomicU32,
    latest: LatestFrame,
    events: Option<Arc<EventHub>>,
}

impl Shared {
    fn state(&self) -> CompositorState {
        CompositorState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: CompositorState) {
        // Stopped is terminal.
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != CompositorState::Stopped as u8).then_some(state as u8)
            });
    }

    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn contribute(&self, key: OrderKey, frame: CaptureFrameDesc) -> Result<(), CaptureError> {
        if self.is_stopped() {
            return Err(CaptureError::Stopped);
        }
        if key.0 >= self.registered.load(Ordering::Acquire) {
            return Err(CaptureError::UnknownSource(key));
        }

        let mut slots = self.slots.lock();
        if slots.pending.insert(key, frame) {
            log::trace!("{key}: replaced pending frame");
        }
        if slots.pending.len() < self.args.req_composite_num {
            return Ok(());
        }

        let full = mem::take(&mut slots.pending);
        match slots.ready.as_mut() {
            // The compositor has not taken the previous batch yet.
            Some(ready) => ready.absorb(full),
            None => slots.ready = Some(full),
        }
        drop(slots);

        self.batch_ready.notify_one();
        Ok(())
    }
}

struct OwnedSource {
    key: OrderKey,
    event_name: String,
    source: Box<dyn CaptureSource>,
    running: bool,
}

/// Assembles frames from several capture sources into composite frames.
///
/// Owns the compositor thread (`hidingin-compositor`). Dropping stops every
/// owned source and joins the thread.
pub struct CompositeCapture {
    shared: Arc<Shared>,
    merger: Arc<dyn LayerMerger>,
    sources: Mutex<Vec<OwnedSource>>,
    /// Serializes registration against start.
    lifecycle: Mutex<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CompositeCapture {
    pub fn new(args: CompositeCaptureArgs, merger: Arc<dyn LayerMerger>) -> Self {
        Self::build(args, merger, None)
    }

    /// Like [`new`](Self::new), also triggering [`COMPOSITE_PUBLISHED`] on
    /// `events` after every publish.
    pub fn with_events(args: CompositeCaptureArgs, merger: Arc<dyn LayerMerger>, events: Arc<EventHub>) -> Self {
        events.register_event(COMPOSITE_PUBLISHED);
        Self::build(args, merger, Some(events))
    }

    fn build(args: CompositeCaptureArgs, merger: Arc<dyn LayerMerger>, events: Option<Arc<EventHub>>) -> Self {
        let shared = Arc::new(Shared {
            args,
            slots: Mutex::new(Slots {
                pending: FrameBatch::new(),
                ready: None,
            }),
            batch_ready: Condvar::new(),
            state: AtomicU8::new(CompositorState::Idle as u8),
            stop: AtomicBool::new(false),
            registered: AtomicU32::new(0),
            latest: LatestFrame::default(),
            events,
        });
        Self {
            shared,
            merger,
            sources: Mutex::new(Vec::new()),
            lifecycle: Mutex::new(()),
            thread: Mutex::new(None),
        }
    }

    pub fn args(&self) -> &CompositeCaptureArgs {
        &self.shared.args
    }

    // ── registration ──────────────────────────────────────────────────────

    /// Assigns the next order key. Sources registered earlier composite
    /// underneath later ones.
    pub fn register_source(&self, args: CaptureArgs) -> Result<OrderKey, CaptureError> {
        let _guard = self.lifecycle.lock();
        match self.shared.state() {
            CompositorState::Idle => {}
            CompositorState::Stopped => return Err(CaptureError::Stopped),
            _ => return Err(CaptureError::AlreadyStarted),
        }

        let key = OrderKey(self.shared.registered.fetch_add(1, Ordering::AcqRel));
        log::debug!("registered capture source `{}` ({:?}) as {key}", args.event_name, args.kind);
        Ok(key)
    }

    /// Registers `source` and takes ownership of it. It is started by
    /// [`start_all`](Self::start_all).
    pub fn add_source(&self, source: Box<dyn CaptureSource>, args: CaptureArgs) -> Result<OrderKey, CaptureError> {
        let event_name = args.event_name.clone();
        let key = self.register_source(args)?;
        self.sources.lock().push(OwnedSource {
            key,
            event_name,
            source,
            running: false,
        });
        Ok(key)
    }

    /// Sink for a source registered with [`register_source`](Self::register_source)
    /// and driven by the caller.
    pub fn sink(&self, key: OrderKey, event_name: impl Into<String>) -> Result<FrameSink, CaptureError> {
        if key.0 >= self.source_count() {
            return Err(CaptureError::UnknownSource(key));
        }
        Ok(FrameSink::new(key, event_name.into(), Arc::clone(&self.shared)))
    }

    pub fn source_count(&self) -> u32 {
        self.shared.registered.load(Ordering::Acquire)
    }

    // ── contribution ──────────────────────────────────────────────────────

    /// Adds `frame` to the current batch, replacing a pending frame with the
    /// same key. A batch holding one frame per required source is handed to
    /// the compositor immediately.
    pub fn contribute(&self, key: OrderKey, frame: CaptureFrameDesc) -> Result<(), CaptureError> {
        self.shared.contribute(key, frame)
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    /// Starts the compositor thread. Owned sources are not started.
    pub fn start(&self) -> Result<(), CaptureError> {
        let _guard = self.lifecycle.lock();
        match self.shared.state() {
            CompositorState::Idle => {}
            CompositorState::Stopped => return Err(CaptureError::Stopped),
            _ => return Err(CaptureError::AlreadyStarted),
        }
        if self.source_count() == 0 {
            return Err(CaptureError::NoSources);
        }

        let shared = Arc::clone(&self.shared);
        let merger = Arc::clone(&self.merger);
        let handle = thread::Builder::new()
            .name(COMPOSITOR_THREAD.to_string())
            .spawn(move || compositor_loop(shared, merger))
            .map_err(CaptureError::Spawn)?;

        self.shared.set_state(CompositorState::Collecting);
        *self.thread.lock() = Some(handle);
        log::info!(
            "compositor started: {} source(s), {} required per batch, {:?} interval",
            self.source_count(),
            self.shared.args.req_composite_num,
            self.shared.args.frame_interval
        );
        Ok(())
    }

    /// Starts the compositor and then every owned source.
    ///
    /// If a source fails to start, everything started so far is stopped and
    /// the compositor is left stopped.
    pub fn start_all(&self) -> Result<(), CaptureError> {
        self.start()?;

        let mut sources = mem::take(&mut *self.sources.lock());
        let mut failure = None;
        for owned in sources.iter_mut() {
            let sink = FrameSink::new(owned.key, owned.event_name.clone(), Arc::clone(&self.shared));
            if let Err(reason) = owned.source.start(sink) {
                failure = Some((owned.source.name().to_string(), reason));
                break;
            }
            owned.running = true;
            log::debug!("capture source `{}` started", owned.source.name());
        }
        self.sources.lock().extend(sources);

        match failure {
            None => Ok(()),
            Some((name, reason)) => {
                log::error!("capture source `{name}` failed to start: {reason:#}");
                self.stop_all();
                Err(CaptureError::SourceStart { name, reason })
            }
        }
    }

    /// Stops the compositor. No frame is published after this returns;
    /// pending frames are dropped. Idempotent.
    pub fn stop(&self) {
        let handle = {
            let _guard = self.lifecycle.lock();
            self.shared.stop.store(true, Ordering::Release);
            self.shared.state.store(CompositorState::Stopped as u8, Ordering::Release);
            {
                // Taking the lock orders the flag before a waiting compositor
                // re-checks it, and after any publish already in progress.
                let mut slots = self.shared.slots.lock();
                slots.pending.clear();
                slots.ready = None;
            }
            self.shared.batch_ready.notify_all();
            self.thread.lock().take()
        };

        // Joined outside `lifecycle`: a publish listener may be calling
        // `stop` concurrently.
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Stopped from a publish listener; the loop exits on its own.
                return;
            }
            if handle.join().is_err() {
                log::error!("compositor thread panicked");
            }
            log::info!("compositor stopped after {} publish(es)", self.shared.latest.count());
        }
    }

    /// Stops every owned source, then the compositor.
    pub fn stop_all(&self) {
        let mut sources = mem::take(&mut *self.sources.lock());
        for owned in sources.iter_mut().filter(|owned| owned.running) {
            owned.source.stop();
            owned.running = false;
            log::debug!("capture source `{}` stopped", owned.source.name());
        }
        self.sources.lock().extend(sources);
        self.stop();
    }

    pub fn state(&self) -> CompositorState {
        self.shared.state()
    }

    pub fn status(&self) -> CaptureStatus {
        match self.shared.state() {
            CompositorState::Idle => CaptureStatus::NotStarted,
            CompositorState::Stopped => CaptureStatus::Stopped,
            _ => CaptureStatus::Running,
        }
    }

    // ── output ────────────────────────────────────────────────────────────

    /// Latest published frame, if any. Never blocks on the compositor.
    pub fn latest_composite_frame(&self) -> Option<PublishedFrame> {
        self.shared.latest.snapshot()
    }

    pub fn publish_count(&self) -> u64 {
        self.shared.latest.count()
    }
}

impl Drop for CompositeCapture {
    fn drop(&mut self) {
        self.stop_all();
    }
}

// ── compositor thread ─────────────────────────────────────────────────────

fn compositor_loop(shared: Arc<Shared>, merger: Arc<dyn LayerMerger>) {
    log::debug!("compositor thread running");
    let mut pacer = CyclePacer::new(shared.args.frame_interval);
    let mut last_layers: BTreeMap<OrderKey, Layer> = BTreeMap::new();

    loop {
        shared.set_state(CompositorState::Collecting);
        let Some(batch) = next_batch(&shared, &pacer) else {
            break;
        };
        let time = pacer.tick();

        if batch.is_empty() {
            log::trace!("cycle {}: no fresh frames", time.cycle_index);
            continue;
        }

        shared.set_state(CompositorState::Composing);
        let layers = assemble_layers(batch, &mut last_layers, shared.args.reuse_stale_layers);
        if layers.iter().all(|layer| layer.stale) {
            continue;
        }

        let texture = match merger.merge(&layers) {
            Ok(texture) => texture,
            Err(err) => {
                log::warn!("cycle {}: merge failed: {err}", time.cycle_index);
                continue;
            }
        };
        let frame = PublishedFrame {
            texture,
            cycle: time.cycle_index,
            keys: layers.iter().map(|layer| layer.key).collect(),
            event_names: layers.iter().map(|layer| layer.event_name.clone()).collect(),
            stale_keys: layers.iter().filter(|layer| layer.stale).map(|layer| layer.key).collect(),
            published_at: time.now,
        };
        let params = publish_params(&frame);
        {
            // `stop` clears the slots under this lock after raising the flag.
            let _slots = shared.slots.lock();
            if shared.is_stopped() {
                break;
            }
            shared.latest.publish(frame);
        }
        shared.set_state(CompositorState::Published);

        if let Some(events) = &shared.events {
            events.trigger(COMPOSITE_PUBLISHED, &params);
        }
    }
    log::debug!("compositor thread exiting");
}

/// Waits for a full batch or the cycle deadline. `None` once stopped.
fn next_batch(shared: &Shared, pacer: &CyclePacer) -> Option<FrameBatch> {
    let deadline = pacer.deadline();
    let mut slots = shared.slots.lock();
    loop {
        if shared.is_stopped() {
            return None;
        }
        if let Some(ready) = slots.ready.take() {
            log::trace!("batch ready with {:?} left in the cycle", pacer.remaining());
            return Some(ready);
        }
        if pacer.is_due() {
            let partial = mem::take(&mut slots.pending);
            if !partial.is_empty() {
                log::debug!(
                    "cycle deadline passed with {}/{} source(s)",
                    partial.len(),
                    shared.args.req_composite_num
                );
            }
            return Some(partial);
        }
        shared.batch_ready.wait_until(&mut slots, deadline);
    }
}

/// Resolves a batch into layers in key order, filling gaps with stale layers.
fn assemble_layers(batch: FrameBatch, last_layers: &mut BTreeMap<OrderKey, Layer>, reuse_stale: bool) -> Vec<Layer> {
    let mut fresh: BTreeMap<OrderKey, Layer> = BTreeMap::new();

    for (key, frame) in batch.into_entries() {
        let (event_name, resolved) = frame.resolve();
        match resolved {
            Ok(texture) => {
                let layer = Layer {
                    key,
                    event_name,
                    texture,
                    stale: false,
                };
                last_layers.insert(key, layer.clone());
                fresh.insert(key, layer);
            }
            Err(err) => {
                log::warn!("{key} (`{event_name}`): frame transform failed: {err}");
                if let Some(previous) = last_layers.get(&key) {
                    fresh.insert(key, Layer { stale: true, ..previous.clone() });
                }
            }
        }
    }

    if reuse_stale {
        for (key, previous) in last_layers.iter() {
            if !fresh.contains_key(key) {
                log::debug!("{key} (`{}`) missed the cycle, reusing its last layer", previous.event_name);
                fresh.insert(*key, Layer { stale: true, ..previous.clone() });
            }
        }
    }

    fresh.into_values().collect()
}

fn publish_params(frame: &PublishedFrame) -> EventParams {
    EventParams::new()
        .with("cycle", EventValue::Int(frame.cycle as i64))
        .with("layers", EventValue::Int(frame.keys.len() as i64))
        .with("frame", EventValue::Texture(frame.texture.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    use crate::pipeline::PipelineError;
    use crate::resource::{PixelFormat, TextureDesc, TextureRef};
    use crate::test_support::FakeTexture;

    const DESC: TextureDesc = TextureDesc::new(16, 16, PixelFormat::Bgra8Unorm);

    /// Records the layers of every merge and returns a fresh texture.
    #[derive(Default)]
    struct RecordingMerger {
        merges: Mutex<Vec<Vec<(OrderKey, String, bool)>>>,
    }

    impl RecordingMerger {
        fn merges(&self) -> Vec<Vec<(OrderKey, String, bool)>> {
            self.merges.lock().clone()
        }
    }

    impl LayerMerger for RecordingMerger {
        fn merge(&self, layers: &[Layer]) -> Result<TextureRef, PipelineError> {
            let mut merges = self.merges.lock();
            merges.push(
                layers
                    .iter()
                    .map(|l| (l.key, l.texture.label().to_string(), l.stale))
                    .collect(),
            );
            Ok(FakeTexture::new(&format!("composite-{}", merges.len()), DESC))
        }
    }

    fn tex(label: &str) -> TextureRef {
        FakeTexture::new(label, DESC)
    }

    fn frame(label: &str) -> CaptureFrameDesc {
        CaptureFrameDesc::new(tex(label), label)
    }

    fn capture(req: usize, interval_ms: u64, reuse_stale: bool) -> (Arc<RecordingMerger>, CompositeCapture) {
        let merger = Arc::new(RecordingMerger::default());
        let args = CompositeCaptureArgs::new(req, interval_ms).with_stale_layers(reuse_stale);
        let capture = CompositeCapture::new(args, merger.clone());
        (merger, capture)
    }

    fn wait_for_publishes(capture: &CompositeCapture, n: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while capture.publish_count() < n {
            assert!(Instant::now() < deadline, "timed out waiting for publish {n}");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn two_sources(capture: &CompositeCapture) -> (OrderKey, OrderKey) {
        let a = capture.register_source(CaptureArgs::whole_desktop("desktop")).unwrap();
        let b = capture.register_source(CaptureArgs::application("app", "Preview")).unwrap();
        (a, b)
    }

    #[test]
    fn keys_are_assigned_in_registration_order() {
        let (_, capture) = capture(2, 16, true);
        let (a, b) = two_sources(&capture);
        assert_eq!((a, b), (OrderKey(0), OrderKey(1)));
        assert_eq!(capture.source_count(), 2);
    }

    #[test]
    fn full_batch_publishes_once_in_key_order() {
        let (merger, capture) = capture(2, 200, true);
        let (a, b) = two_sources(&capture);
        capture.start().unwrap();

        capture.contribute(b, frame("tb")).unwrap();
        capture.contribute(a, frame("ta")).unwrap();
        wait_for_publishes(&capture, 1);
        thread::sleep(Duration::from_millis(30));

        assert_eq!(
            merger.merges(),
            vec![vec![(a, "ta".to_string(), false), (b, "tb".to_string(), false)]]
        );
        let latest = capture.latest_composite_frame().unwrap();
        assert_eq!(latest.keys, vec![a, b]);
        assert_eq!(latest.event_names, vec!["ta", "tb"]);
        assert!(latest.stale_keys.is_empty());
        assert_eq!(capture.publish_count(), 1);
    }

    #[test]
    fn missing_source_publishes_at_deadline() {
        let (merger, capture) = capture(2, 40, true);
        let (a, _b) = two_sources(&capture);
        let started = Instant::now();
        capture.start().unwrap();

        capture.contribute(a, frame("ta")).unwrap();
        wait_for_publishes(&capture, 1);

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(30), "published too early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "published too late: {elapsed:?}");
        assert_eq!(merger.merges()[0], vec![(a, "ta".to_string(), false)]);
    }

    #[test]
    fn same_key_within_window_is_replaced() {
        let (merger, capture) = capture(2, 200, true);
        let (a, b) = two_sources(&capture);
        capture.start().unwrap();

        capture.contribute(a, frame("ta1")).unwrap();
        capture.contribute(a, frame("ta2")).unwrap();
        capture.contribute(b, frame("tb")).unwrap();
        wait_for_publishes(&capture, 1);

        assert_eq!(
            merger.merges()[0],
            vec![(a, "ta2".to_string(), false), (b, "tb".to_string(), false)]
        );
    }

    #[test]
    fn stale_layer_fills_in_for_missing_source() {
        let (merger, capture) = capture(2, 40, true);
        let (a, b) = two_sources(&capture);
        capture.start().unwrap();

        capture.contribute(a, frame("ta1")).unwrap();
        capture.contribute(b, frame("tb1")).unwrap();
        wait_for_publishes(&capture, 1);
        capture.contribute(a, frame("ta2")).unwrap();
        wait_for_publishes(&capture, 2);

        assert_eq!(
            merger.merges()[1],
            vec![(a, "ta2".to_string(), false), (b, "tb1".to_string(), true)]
        );
        assert_eq!(capture.latest_composite_frame().unwrap().stale_keys, vec![b]);
    }

    #[test]
    fn stale_reuse_can_be_disabled() {
        let (merger, capture) = capture(2, 40, false);
        let (a, b) = two_sources(&capture);
        capture.start().unwrap();

        capture.contribute(a, frame("ta1")).unwrap();
        capture.contribute(b, frame("tb1")).unwrap();
        wait_for_publishes(&capture, 1);
        capture.contribute(a, frame("ta2")).unwrap();
        wait_for_publishes(&capture, 2);

        assert_eq!(merger.merges()[1], vec![(a, "ta2".to_string(), false)]);
    }

    #[test]
    fn idle_cycles_publish_nothing() {
        let (merger, capture) = capture(1, 10, true);
        let a = capture.register_source(CaptureArgs::whole_desktop("desktop")).unwrap();
        capture.start().unwrap();

        capture.contribute(a, frame("ta")).unwrap();
        wait_for_publishes(&capture, 1);
        thread::sleep(Duration::from_millis(60));

        assert_eq!(capture.publish_count(), 1);
        assert_eq!(merger.merges().len(), 1);
    }

    #[test]
    fn transform_runs_before_merge() {
        let (merger, capture) = capture(1, 200, true);
        let a = capture.register_source(CaptureArgs::whole_desktop("desktop")).unwrap();
        capture.start().unwrap();

        capture
            .contribute(a, frame("raw").with_transform(|_| Ok(tex("cropped"))))
            .unwrap();
        wait_for_publishes(&capture, 1);

        assert_eq!(merger.merges()[0], vec![(a, "cropped".to_string(), false)]);
    }

    #[test]
    fn failed_transform_falls_back_to_last_layer() {
        let (merger, capture) = capture(2, 40, true);
        let (a, b) = two_sources(&capture);
        capture.start().unwrap();

        capture.contribute(a, frame("ta1")).unwrap();
        capture.contribute(b, frame("tb1")).unwrap();
        wait_for_publishes(&capture, 1);
        capture
            .contribute(a, frame("ta2").with_transform(|_| Err(PipelineError::NoLayers)))
            .unwrap();
        capture.contribute(b, frame("tb2")).unwrap();
        wait_for_publishes(&capture, 2);

        assert_eq!(
            merger.merges()[1],
            vec![(a, "ta1".to_string(), true), (b, "tb2".to_string(), false)]
        );
    }

    #[test]
    fn registration_and_contribution_are_validated() {
        let (_, capture) = capture(1, 16, true);
        assert!(matches!(capture.start(), Err(CaptureError::NoSources)));

        let a = capture.register_source(CaptureArgs::whole_desktop("desktop")).unwrap();
        assert!(matches!(
            capture.contribute(OrderKey(7), frame("x")),
            Err(CaptureError::UnknownSource(OrderKey(7)))
        ));

        capture.start().unwrap();
        assert_eq!(capture.status(), CaptureStatus::Running);
        assert!(matches!(
            capture.register_source(CaptureArgs::whole_desktop("late")),
            Err(CaptureError::AlreadyStarted)
        ));
        assert!(matches!(capture.start(), Err(CaptureError::AlreadyStarted)));

        capture.stop();
        assert_eq!(capture.status(), CaptureStatus::Stopped);
        assert_eq!(capture.state(), CompositorState::Stopped);
        assert!(matches!(capture.contribute(a, frame("x")), Err(CaptureError::Stopped)));
        assert!(matches!(
            capture.register_source(CaptureArgs::whole_desktop("later")),
            Err(CaptureError::Stopped)
        ));
    }

    #[test]
    fn stop_is_prompt_and_final() {
        let (merger, capture) = capture(2, 1_000, true);
        let (a, _b) = two_sources(&capture);
        capture.start().unwrap();
        capture.contribute(a, frame("ta")).unwrap();

        let begun = Instant::now();
        capture.stop();
        assert!(begun.elapsed() < Duration::from_millis(500));

        thread::sleep(Duration::from_millis(20));
        assert_eq!(capture.publish_count(), 0);
        assert!(merger.merges().is_empty());
        capture.stop();
    }

    #[test]
    fn publish_triggers_event() {
        let merger = Arc::new(RecordingMerger::default());
        let events = Arc::new(EventHub::new());
        let layers_seen = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&layers_seen);
        events.register_listener(COMPOSITE_PUBLISHED, move |p: &EventParams| {
            seen.store(p.int("layers").unwrap_or(0) as usize, Ordering::SeqCst);
        });
        let capture = CompositeCapture::with_events(CompositeCaptureArgs::new(1, 200), merger, events.clone());
        let a = capture.register_source(CaptureArgs::whole_desktop("desktop")).unwrap();
        capture.start().unwrap();

        capture.contribute(a, frame("ta")).unwrap();

        assert!(events.wait_for(COMPOSITE_PUBLISHED, Duration::from_secs(5)));
        assert!(events.is_registered(COMPOSITE_PUBLISHED));
        assert_eq!(layers_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_from_listener_races_owner_stop_without_deadlock() {
        let merger = Arc::new(RecordingMerger::default());
        let events = Arc::new(EventHub::new());
        let capture = Arc::new(CompositeCapture::with_events(
            CompositeCaptureArgs::new(1, 200),
            merger,
            events.clone(),
        ));
        let a = capture.register_source(CaptureArgs::whole_desktop("desktop")).unwrap();

        let (listening_tx, listening_rx) = crossbeam_channel::bounded(1);
        let weak = Arc::downgrade(&capture);
        events.register_listener(COMPOSITE_PUBLISHED, move |_: &EventParams| {
            let _ = listening_tx.try_send(());
            thread::sleep(Duration::from_millis(100));
            if let Some(capture) = weak.upgrade() {
                capture.stop();
            }
        });

        capture.start().unwrap();
        capture.contribute(a, frame("ta")).unwrap();
        listening_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // The owner stops while the listener is still sleeping inside the
        // compositor thread; both stops must return.
        let (stopped_tx, stopped_rx) = crossbeam_channel::bounded(1);
        let owner = Arc::clone(&capture);
        thread::spawn(move || {
            owner.stop();
            let _ = stopped_tx.send(());
        });

        assert!(
            stopped_rx.recv_timeout(Duration::from_secs(3)).is_ok(),
            "owner stop did not return"
        );
        assert_eq!(capture.status(), CaptureStatus::Stopped);
        assert_eq!(capture.publish_count(), 1);
    }

    #[test]
    fn partial_batch_publishes_within_an_interval_of_the_previous_one() {
        let interval = Duration::from_millis(50);
        let (merger, capture) = capture(2, interval.as_millis() as u64, true);
        let (a, b) = two_sources(&capture);
        capture.start().unwrap();

        capture.contribute(a, frame("ta1")).unwrap();
        capture.contribute(b, frame("tb1")).unwrap();
        wait_for_publishes(&capture, 1);
        let first = capture.latest_composite_frame().unwrap();

        capture.contribute(a, frame("ta2")).unwrap();
        wait_for_publishes(&capture, 2);
        let second = capture.latest_composite_frame().unwrap();

        let gap = second.published_at.duration_since(first.published_at);
        assert!(gap >= interval, "published before the deadline: {gap:?}");
        assert!(gap < interval * 3, "published too late: {gap:?}");
        assert_eq!(second.stale_keys, vec![b]);
        assert_eq!(merger.merges().len(), 2);
    }

    // ── owned sources ─────────────────────────────────────────────────────

    struct ScriptedSource {
        name: String,
        frames: Vec<&'static str>,
        fail: bool,
        stopped: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        fn boxed(name: &str, frames: Vec<&'static str>, fail: bool) -> (Box<dyn CaptureSource>, Arc<AtomicBool>) {
            let stopped = Arc::new(AtomicBool::new(false));
            let source = Self {
                name: name.to_string(),
                frames,
                fail,
                stopped: Arc::clone(&stopped),
            };
            (Box::new(source), stopped)
        }
    }

    impl CaptureSource for ScriptedSource {
        fn name(&self) -> &str {
            &self.name
        }

        fn start(&mut self, sink: FrameSink) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("permission denied");
            }
            for label in &self.frames {
                sink.contribute(tex(label))?;
            }
            Ok(())
        }

        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn start_all_starts_owned_sources_with_bound_sinks() {
        let (merger, capture) = capture(2, 200, true);
        let (desktop, desktop_stopped) = ScriptedSource::boxed("desktop", vec!["wallpaper"], false);
        let (app, app_stopped) = ScriptedSource::boxed("app", vec!["window"], false);
        let a = capture.add_source(desktop, CaptureArgs::whole_desktop("desktop")).unwrap();
        let b = capture.add_source(app, CaptureArgs::application("app", "Notes")).unwrap();
        assert_eq!(capture.status(), CaptureStatus::NotStarted);

        capture.start_all().unwrap();
        wait_for_publishes(&capture, 1);

        assert_eq!(
            merger.merges()[0],
            vec![(a, "wallpaper".to_string(), false), (b, "window".to_string(), false)]
        );
        assert_eq!(capture.latest_composite_frame().unwrap().event_names, vec!["desktop", "app"]);

        capture.stop_all();
        assert!(desktop_stopped.load(Ordering::SeqCst));
        assert!(app_stopped.load(Ordering::SeqCst));
        assert_eq!(capture.status(), CaptureStatus::Stopped);
    }

    #[test]
    fn failing_source_stops_everything_started() {
        let (_, capture) = capture(2, 200, true);
        let (good, good_stopped) = ScriptedSource::boxed("good", Vec::new(), false);
        let (bad, bad_stopped) = ScriptedSource::boxed("bad", Vec::new(), true);
        capture.add_source(good, CaptureArgs::whole_desktop("good")).unwrap();
        capture.add_source(bad, CaptureArgs::whole_desktop("bad")).unwrap();

        match capture.start_all() {
            Err(CaptureError::SourceStart { name, .. }) => assert_eq!(name, "bad"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(good_stopped.load(Ordering::SeqCst));
        assert!(!bad_stopped.load(Ordering::SeqCst));
        assert_eq!(capture.status(), CaptureStatus::Stopped);
    }

    #[test]
    fn sink_rejects_unregistered_keys() {
        let (_, capture) = capture(1, 16, true);
        assert!(matches!(capture.sink(OrderKey(0), "x"), Err(CaptureError::UnknownSource(_))));
        let a = capture.register_source(CaptureArgs::whole_desktop("desktop")).unwrap();
        let sink = capture.sink(a, "desktop").unwrap();
        assert_eq!(sink.key(), a);
        assert_eq!(sink.event_name(), "desktop");
    }
}
