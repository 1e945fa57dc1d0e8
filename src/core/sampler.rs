/// Background sampling activity
///
/// The sampler owns the `HistoryStore` outright. Each tick it samples all four
/// metrics, pushes them and sends a snapshot to the render task. It never
/// draws anything itself.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::history::{DashboardSnapshot, HistoryStore, MetricKind};
use crate::core::probes::Probe;

/// Messages accepted by the render task
#[derive(Debug, Clone)]
pub enum RenderRequest {
    Frame(Box<DashboardSnapshot>),
    Resize(u16, u16),
}

/// Display changes requested from the input loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerCommand {
    StepZoom(MetricKind),
    ResetZoom,
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerConfig {
    pub interval: Duration,
    /// Consecutive ticks without the process before giving up (0 = never)
    pub exit_after: u32,
}

/// What the sampler hands back when it stops
#[derive(Debug)]
pub struct SamplerReport {
    pub ticks: u64,
    pub exited: bool,
    pub store: HistoryStore,
}

pub struct Sampler<P: Probe> {
    /// Lent to a blocking thread for the duration of each tick
    probe: Option<P>,
    store: HistoryStore,
    config: SamplerConfig,
    render_tx: mpsc::UnboundedSender<RenderRequest>,
    commands: mpsc::UnboundedReceiver<SamplerCommand>,
    size: watch::Receiver<(u16, u16)>,
    cancel: CancellationToken,
    missing_ticks: u32,
}

impl<P: Probe + 'static> Sampler<P> {
    pub fn new(
        probe: P,
        store: HistoryStore,
        config: SamplerConfig,
        render_tx: mpsc::UnboundedSender<RenderRequest>,
        commands: mpsc::UnboundedReceiver<SamplerCommand>,
        size: watch::Receiver<(u16, u16)>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            probe: Some(probe),
            store,
            config,
            render_tx,
            commands,
            size,
            cancel,
            missing_ticks: 0,
        }
    }

    /// Run until cancelled, the process exits, or the render task goes away
    pub async fn run(mut self) -> SamplerReport {
        let period = self.config.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut ticks = 0u64;
        let mut commands_open = true;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(ticks, "sampler cancelled");
                    break;
                }
                command = self.commands.recv(), if commands_open => match command {
                    Some(command) => {
                        self.apply(command);
                        if !self.publish() {
                            break;
                        }
                    }
                    None => commands_open = false,
                },
                _ = ticker.tick() => {
                    // Never start a tick once cancellation is visible
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    if !self.tick().await {
                        break;
                    }
                    ticks += 1;
                    if !self.publish() {
                        debug!("render channel closed, stopping sampler");
                        break;
                    }
                    if self.store.is_exited() {
                        info!(ticks, "target process exited, sampling stopped");
                        break;
                    }
                }
            }
        }

        SamplerReport {
            ticks,
            exited: self.store.is_exited(),
            store: self.store,
        }
    }

    /// Sample every metric once. Returns false if the probe is gone.
    async fn tick(&mut self) -> bool {
        let Some(mut probe) = self.probe.take() else {
            return false;
        };

        // /proc reads and lsof/netstat calls block, so they run off the workers
        let sampled = tokio::task::spawn_blocking(move || {
            let alive = probe.refresh();
            let samples = MetricKind::ALL.map(|kind| probe.sample(kind));
            (probe, alive, samples)
        })
        .await;

        let (probe, alive, samples) = match sampled {
            Ok(sampled) => sampled,
            Err(e) => {
                error!("probe task failed: {}", e);
                return false;
            }
        };
        self.probe = Some(probe);

        for (kind, sample) in MetricKind::ALL.into_iter().zip(samples) {
            if sample.is_failed() {
                debug!(%kind, "probe failed this tick");
            }
            self.store.push(kind, sample);
        }

        if alive {
            self.missing_ticks = 0;
            return true;
        }

        self.missing_ticks += 1;
        warn!(missing = self.missing_ticks, "target process not found");
        if self.config.exit_after > 0 && self.missing_ticks >= self.config.exit_after {
            self.store.mark_exited();
        }
        true
    }

    fn apply(&mut self, command: SamplerCommand) {
        match command {
            SamplerCommand::StepZoom(kind) => self.store.step_zoom(kind),
            SamplerCommand::ResetZoom => self.store.reset_zoom(),
        }
        debug!(?command, "zoom changed");
    }

    fn publish(&self) -> bool {
        let size = *self.size.borrow();
        let snapshot = self.store.snapshot(size);
        self.render_tx
            .send(RenderRequest::Frame(Box::new(snapshot)))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::history::Sample;
    use crate::core::probes::{MockProbe, NetKind, SystemProbe};
    use crate::core::resolver::ProcessHandle;

    struct Harness {
        render_rx: mpsc::UnboundedReceiver<RenderRequest>,
        command_tx: mpsc::UnboundedSender<SamplerCommand>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<SamplerReport>,
    }

    fn healthy_probe() -> MockProbe {
        let mut probe = MockProbe::new();
        probe.expect_refresh().returning(|| true);
        probe
            .expect_sample()
            .returning(|kind| Sample::Value(kind.index() as f64 + 1.0));
        probe
    }

    fn start<P: Probe + 'static>(probe: P, interval_ms: u64, exit_after: u32) -> Harness {
        start_with(probe, interval_ms, exit_after, CancellationToken::new())
    }

    fn start_with<P: Probe + 'static>(
        probe: P,
        interval_ms: u64,
        exit_after: u32,
        cancel: CancellationToken,
    ) -> Harness {
        let interval = Duration::from_millis(interval_ms);
        let store = HistoryStore::new("test", 1234, 16, interval);
        let (render_tx, render_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (_size_tx, size_rx) = watch::channel((80, 24));
        let sampler = Sampler::new(
            probe,
            store,
            SamplerConfig { interval, exit_after },
            render_tx,
            command_rx,
            size_rx,
            cancel.clone(),
        );
        Harness {
            render_rx,
            command_tx,
            cancel,
            handle: tokio::spawn(sampler.run()),
        }
    }

    fn drain_frames(rx: &mut mpsc::UnboundedReceiver<RenderRequest>) -> Vec<DashboardSnapshot> {
        let mut frames = Vec::new();
        while let Ok(request) = rx.try_recv() {
            if let RenderRequest::Frame(snapshot) = request {
                frames.push(*snapshot);
            }
        }
        frames
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_per_interval() {
        let harness = start(healthy_probe(), 200, 0);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        harness.cancel.cancel();
        let report = harness.handle.await.unwrap();

        for kind in MetricKind::ALL {
            let len = report.store.series(kind).len();
            assert!((4..=5).contains(&len), "{} has {} samples", kind, len);
        }
        assert_eq!(
            report.store.series(MetricKind::Memory).latest(),
            Some(Sample::Value(2.0))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_allows_at_most_one_more_tick() {
        let mut harness = start(healthy_probe(), 100, 0);
        tokio::time::sleep(Duration::from_millis(350)).await;
        let seen = drain_frames(&mut harness.render_rx).len() as u64;

        harness.cancel.cancel();
        let report = harness.handle.await.unwrap();
        assert!(report.ticks >= seen);
        assert!(report.ticks <= seen + 1);
        assert!(!report.exited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_tick_finishes_that_tick_only() {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let mut probe = MockProbe::new();
        probe.expect_refresh().times(1).returning(move || {
            token.cancel();
            true
        });
        probe.expect_sample().times(4).returning(|_| Sample::Value(1.0));

        let mut harness = start_with(probe, 100, 0, cancel);
        let report = harness.handle.await.unwrap();
        assert_eq!(report.ticks, 1);
        for kind in MetricKind::ALL {
            assert_eq!(report.store.series(kind).len(), 1);
        }
        // The interrupted tick is still published whole
        assert_eq!(drain_frames(&mut harness.render_rx).len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_slow_sampling_leaves_runtime_responsive() {
        let mut probe = MockProbe::new();
        probe.expect_refresh().returning(|| {
            std::thread::sleep(Duration::from_millis(400));
            true
        });
        probe.expect_sample().returning(|_| Sample::Value(1.0));

        let harness = start(probe, 10, 0);
        // Let the first tick get under way
        tokio::time::sleep(Duration::from_millis(50)).await;

        let timer = tokio::spawn(async {
            let started = std::time::Instant::now();
            tokio::time::sleep(Duration::from_millis(5)).await;
            started.elapsed()
        });
        let elapsed = timer.await.unwrap();
        assert!(elapsed < Duration::from_millis(200), "timer took {:?}", elapsed);

        harness.cancel.cancel();
        let report = harness.handle.await.unwrap();
        assert!(report.ticks >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_tick() {
        let mut probe = MockProbe::new();
        probe.expect_refresh().never();
        probe.expect_sample().never();

        let mut harness = start(probe, 500, 0);
        harness.cancel.cancel();
        let report = harness.handle.await.unwrap();
        assert_eq!(report.ticks, 0);
        assert!(drain_frames(&mut harness.render_rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_process_exit() {
        let mut probe = MockProbe::new();
        probe.expect_refresh().times(3).returning(|| false);
        probe.expect_sample().returning(|kind| match kind {
            MetricKind::NetworkConnections => Sample::Value(10.0),
            _ => Sample::Failed,
        });

        let mut harness = start(probe, 100, 3);
        let report = harness.handle.await.unwrap();
        assert_eq!(report.ticks, 3);
        assert!(report.exited);

        let frames = drain_frames(&mut harness.render_rx);
        assert_eq!(frames.len(), 3);
        assert!(!frames[1].exited);
        assert!(frames[2].exited);
        assert_eq!(frames[2].series(MetricKind::Cpu).latest(), Some(Sample::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_process_resets_missing_count() {
        let mut probe = MockProbe::new();
        let mut calls = 0;
        probe.expect_refresh().returning(move || {
            calls += 1;
            // missing, missing, present, missing, missing, ...
            calls % 3 == 0
        });
        probe.expect_sample().returning(|_| Sample::Failed);

        let harness = start(probe, 100, 3);
        tokio::time::sleep(Duration::from_millis(1050)).await;
        harness.cancel.cancel();
        let report = harness.handle.await.unwrap();
        assert!(!report.exited);
        assert!(report.ticks >= 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zoom_command_republishes_without_sampling() {
        let mut probe = MockProbe::new();
        probe.expect_refresh().never();
        probe.expect_sample().never();

        let mut harness = start(probe, 10_000, 0);
        harness
            .command_tx
            .send(SamplerCommand::StepZoom(MetricKind::Cpu))
            .unwrap();

        let frame = match harness.render_rx.recv().await {
            Some(RenderRequest::Frame(snapshot)) => snapshot,
            other => panic!("expected frame, got {:?}", other),
        };
        assert_eq!(frame.zoom(MetricKind::Cpu).factor(), 2.0);
        assert!(frame.series(MetricKind::Cpu).is_empty());
        assert_eq!((frame.width, frame.height), (80, 24));

        harness.cancel.cancel();
        assert_eq!(harness.handle.await.unwrap().ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_render_channel_stops_sampler() {
        let harness = start(healthy_probe(), 100, 0);
        drop(harness.render_rx);
        let report = harness.handle.await.unwrap();
        assert_eq!(report.ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_probe_records_memory_after_one_interval() {
        let handle = ProcessHandle::new(std::process::id(), "self");
        let probe = SystemProbe::new(&handle, NetKind::All, Duration::from_secs(2));
        let mut harness = start(probe, 200, 0);

        let frame = match harness.render_rx.recv().await {
            Some(RenderRequest::Frame(snapshot)) => snapshot,
            other => panic!("expected frame, got {:?}", other),
        };
        let memory = frame.series(MetricKind::Memory);
        assert_eq!(memory.len(), 1);
        assert!(memory.latest().and_then(|s| s.value()).map_or(false, |v| v >= 0.0));

        harness.cancel.cancel();
        harness.handle.await.unwrap();
    }
}
