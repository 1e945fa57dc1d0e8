/// Main TUI application
///
/// Two activities run while the dashboard is up: the sampler task, and the
/// input loop on the caller's task. A third task owns the `Terminal` and is the
/// only place `draw` is ever called; everything else talks to it through the
/// render channel.

use anyhow::{anyhow, Context, Result};
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::{Stream, StreamExt};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::io;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::core::history::{DashboardSnapshot, HistoryStore, MetricKind};
use crate::core::probes::{Probe, SystemProbe};
use crate::core::resolver::ProcessHandle;
use crate::core::sampler::{RenderRequest, Sampler, SamplerCommand, SamplerConfig};
use crate::screens;
use crate::utils::MonitorSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Running,
    Cancelling,
    Stopped,
}

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    Zoom(MetricKind),
    ResetZoom,
}

pub fn key_action(key: KeyEvent) -> Option<KeyAction> {
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(KeyAction::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(KeyAction::Quit),
        KeyCode::Char('0') => Some(KeyAction::ResetZoom),
        KeyCode::Char(c @ '1'..='4') => {
            let index = c as usize - '1' as usize;
            Some(KeyAction::Zoom(MetricKind::ALL[index]))
        }
        _ => None,
    }
}

pub struct App {
    target: ProcessHandle,
    settings: MonitorSettings,
    phase: Phase,
}

impl App {
    pub fn new(target: ProcessHandle, settings: MonitorSettings) -> Self {
        Self {
            target,
            settings,
            phase: Phase::Initializing,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        info!(from = ?self.phase, to = ?phase, "phase change");
        self.phase = phase;
    }

    /// Initial empty store for the target
    fn build_store(&self, natural_max: [Option<f64>; 4]) -> HistoryStore {
        HistoryStore::new(
            self.target.name.clone(),
            self.target.pid,
            self.settings.history,
            self.settings.interval,
        )
        .with_zoom(self.settings.zoom)
        .with_natural_max(natural_max)
    }

    pub async fn run(&mut self) -> Result<()> {
        // Priming the CPU baseline sleeps, keep it off the runtime
        let (target, net_kind, timeout) = (self.target.clone(), self.settings.net_kind, self.settings.probe_timeout);
        let probe = tokio::task::spawn_blocking(move || SystemProbe::new(&target, net_kind, timeout))
            .await
            .context("probe setup failed")?;
        let store = self.build_store(probe.natural_max());

        // Setup terminal
        enable_raw_mode().context("Failed to enable raw mode")?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e).context("Failed to enter alternate screen");
        }
        let terminal = match Terminal::new(CrosstermBackend::new(stdout)) {
            Ok(terminal) => terminal,
            Err(e) => {
                restore_terminal();
                return Err(e).context("Failed to initialize terminal");
            }
        };

        let result = self
            .run_dashboard(terminal, probe, store, Box::pin(EventStream::new()))
            .await;

        // Restore terminal
        restore_terminal();

        result.map(|_| ())
    }

    /// Drive the dashboard until quit, returning the terminal for teardown
    pub async fn run_dashboard<B, P, S>(
        &mut self,
        terminal: Terminal<B>,
        probe: P,
        store: HistoryStore,
        mut events: S,
    ) -> Result<Terminal<B>>
    where
        B: Backend + Send + 'static,
        P: Probe + 'static,
        S: Stream<Item = io::Result<Event>> + Unpin,
    {
        let area = terminal.size().context("Failed to query terminal size")?;
        let (size_tx, size_rx) = watch::channel((area.width, area.height));
        let (render_tx, render_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        // The empty frame is queued before the sampler exists, so it is drawn first
        render_tx
            .send(RenderRequest::Frame(Box::new(store.snapshot((area.width, area.height)))))
            .map_err(|_| anyhow!("render task unavailable"))?;
        let renderer = tokio::spawn(render_loop(terminal, render_rx, cancel.clone()));

        let sampler = Sampler::new(
            probe,
            store,
            SamplerConfig {
                interval: self.settings.interval,
                exit_after: self.settings.exit_after,
            },
            render_tx.clone(),
            command_rx,
            size_rx,
            cancel.clone(),
        );
        let sampler = tokio::spawn(sampler.run());
        self.enter(Phase::Running);

        let input = input_loop(&mut events, &render_tx, &size_tx, &command_tx, &cancel).await;

        self.enter(Phase::Cancelling);
        cancel.cancel();

        let report = sampler.await.context("sampler task failed")?;
        info!(ticks = report.ticks, exited = report.exited, "sampler stopped");

        drop(render_tx);
        drop(command_tx);
        let terminal = renderer.await.context("render task failed")??;

        self.enter(Phase::Stopped);
        input.map(|_| terminal)
    }
}

/// Sole owner of the terminal: draws every frame it is sent
pub async fn render_loop<B: Backend>(
    mut terminal: Terminal<B>,
    mut requests: mpsc::UnboundedReceiver<RenderRequest>,
    cancel: CancellationToken,
) -> Result<Terminal<B>> {
    let mut last: Option<DashboardSnapshot> = None;

    while let Some(request) = requests.recv().await {
        let snapshot = match request {
            RenderRequest::Frame(snapshot) => *snapshot,
            RenderRequest::Resize(width, height) => match last.take() {
                Some(snapshot) => snapshot.with_size(width, height),
                None => continue,
            },
        };

        if let Err(e) = terminal.draw(|frame| screens::render(frame, &snapshot)) {
            error!("draw failed: {}", e);
            cancel.cancel();
            return Err(e).context("Failed to draw dashboard");
        }
        last = Some(snapshot);
    }

    debug!("render channel closed");
    Ok(terminal)
}

/// Wait for input until quit, cancellation, or the input stream ends
async fn input_loop<S>(
    events: &mut S,
    render_tx: &mpsc::UnboundedSender<RenderRequest>,
    size_tx: &watch::Sender<(u16, u16)>,
    command_tx: &mpsc::UnboundedSender<SamplerCommand>,
    cancel: &CancellationToken,
) -> Result<()>
where
    S: Stream<Item = io::Result<Event>> + Unpin,
{
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            event = events.next() => event,
        };

        match event {
            None => {
                debug!("input stream closed");
                return Ok(());
            }
            Some(Err(e)) => return Err(e).context("Failed to read terminal input"),
            Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => match key_action(key) {
                Some(KeyAction::Quit) => return Ok(()),
                // The sampler may already have stopped after the process exited
                Some(KeyAction::Zoom(kind)) => {
                    let _ = command_tx.send(SamplerCommand::StepZoom(kind));
                }
                Some(KeyAction::ResetZoom) => {
                    let _ = command_tx.send(SamplerCommand::ResetZoom);
                }
                None => {}
            },
            Some(Ok(Event::Resize(width, height))) => {
                let _ = size_tx.send((width, height));
                let _ = render_tx.send(RenderRequest::Resize(width, height));
            }
            Some(Ok(_)) => {}
        }
    }
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::history::{Sample, ZoomConfig};
    use crate::core::probes::{MockProbe, NetKind};
    use futures::channel::mpsc as fmpsc;
    use ratatui::{backend::TestBackend, buffer::Buffer};
    use std::time::Duration;

    fn buffer_text(buffer: &Buffer) -> String {
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer.get(x, y).symbol());
            }
            out.push('\n');
        }
        out
    }

    fn press(code: KeyCode) -> io::Result<Event> {
        Ok(Event::Key(KeyEvent::new(code, KeyModifiers::NONE)))
    }

    fn settings(interval_ms: u64) -> MonitorSettings {
        MonitorSettings {
            interval: Duration::from_millis(interval_ms),
            history: 8,
            zoom: [ZoomConfig::default(); 4],
            net_kind: NetKind::All,
            exit_after: 0,
            probe_timeout: Duration::from_secs(1),
        }
    }

    fn app(interval_ms: u64) -> App {
        App::new(ProcessHandle::new(1234, "nginx"), settings(interval_ms))
    }

    fn probe() -> MockProbe {
        let mut probe = MockProbe::new();
        probe.expect_refresh().returning(|| true);
        probe.expect_sample().returning(|_| Sample::Value(5.0));
        probe
    }

    #[test]
    fn test_key_actions() {
        let key = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert_eq!(key_action(key(KeyCode::Char('q'))), Some(KeyAction::Quit));
        assert_eq!(key_action(key(KeyCode::Esc)), Some(KeyAction::Quit));
        assert_eq!(
            key_action(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(KeyAction::Quit)
        );
        assert_eq!(key_action(key(KeyCode::Char('c'))), None);
        assert_eq!(key_action(key(KeyCode::Char('1'))), Some(KeyAction::Zoom(MetricKind::Cpu)));
        assert_eq!(key_action(key(KeyCode::Char('4'))), Some(KeyAction::Zoom(MetricKind::OpenFiles)));
        assert_eq!(key_action(key(KeyCode::Char('5'))), None);
        assert_eq!(key_action(key(KeyCode::Char('0'))), Some(KeyAction::ResetZoom));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_quit_shows_empty_dashboard() {
        let mut probe = MockProbe::new();
        probe.expect_refresh().never();
        probe.expect_sample().never();

        let mut app = app(500);
        let store = app.build_store([Some(100.0), None, None, None]);
        let terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        let events = futures::stream::iter(vec![press(KeyCode::Char('q'))]);

        let terminal = app.run_dashboard(terminal, probe, store, events).await.unwrap();
        assert_eq!(app.phase(), Phase::Stopped);

        let text = buffer_text(terminal.backend().buffer());
        assert!(text.contains("nginx (pid 1234)"));
        assert!(text.contains("CPU -- / 100.00% (1.0x)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_zoom_and_quit() {
        let mut app = app(100);
        let store = app.build_store([Some(100.0), None, None, None]);
        let terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        let (tx, rx) = fmpsc::unbounded();

        let driver = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            tx.unbounded_send(press(KeyCode::Char('1'))).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.unbounded_send(press(KeyCode::Char('q'))).unwrap();
        });

        let terminal = app.run_dashboard(terminal, probe(), store, rx).await.unwrap();
        driver.await.unwrap();
        assert_eq!(app.phase(), Phase::Stopped);

        let text = buffer_text(terminal.backend().buffer());
        assert!(text.contains("CPU 5.00% / 50.00% (2.0x)"));
        assert!(text.contains("FILES 5 / 5 (1.0x)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_input_stream_stops_dashboard() {
        let mut app = app(100);
        let store = app.build_store([None; 4]);
        let terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let events = futures::stream::empty::<io::Result<Event>>();

        app.run_dashboard(terminal, probe(), store, events).await.unwrap();
        assert_eq!(app.phase(), Phase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_error_is_reported() {
        let mut app = app(100);
        let store = app.build_store([None; 4]);
        let terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let events = futures::stream::iter(vec![Err(io::Error::new(io::ErrorKind::Other, "tty gone"))]);

        let err = app.run_dashboard(terminal, probe(), store, events).await.unwrap_err();
        assert!(err.to_string().contains("terminal input"));
        assert_eq!(app.phase(), Phase::Stopped);
    }

    #[tokio::test]
    async fn test_render_loop_returns_terminal_when_closed() {
        let store = HistoryStore::new("nginx", 1234, 4, Duration::from_millis(500));
        let (tx, rx) = mpsc::unbounded_channel();
        let terminal = Terminal::new(TestBackend::new(60, 20)).unwrap();

        // A resize before any frame has nothing to redraw
        tx.send(RenderRequest::Resize(60, 20)).unwrap();
        tx.send(RenderRequest::Frame(Box::new(store.snapshot((60, 20))))).unwrap();
        tx.send(RenderRequest::Resize(60, 20)).unwrap();
        drop(tx);

        let cancel = CancellationToken::new();
        let terminal = render_loop(terminal, rx, cancel.clone()).await.unwrap();
        assert!(!cancel.is_cancelled());
        assert!(buffer_text(terminal.backend().buffer()).contains("nginx (pid 1234)"));
    }
}
