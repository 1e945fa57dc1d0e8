/// Rolling per-metric history and the snapshot handed to the renderer
///
/// The store is owned by the sampler task. The renderer only ever sees a
/// `DashboardSnapshot`, which is a deep copy.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Default number of samples kept per metric
pub const DEFAULT_CAPACITY: usize = 512;

/// Zoom levels cycled by the dashboard keys
pub const ZOOM_STEPS: &[f64] = &[1.0, 2.0, 4.0, 8.0, 16.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Cpu,
    Memory,
    NetworkConnections,
    OpenFiles,
}

impl MetricKind {
    /// Panel order: top-left, top-right, bottom-left, bottom-right
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Cpu,
        MetricKind::Memory,
        MetricKind::NetworkConnections,
        MetricKind::OpenFiles,
    ];

    pub fn index(&self) -> usize {
        match self {
            MetricKind::Cpu => 0,
            MetricKind::Memory => 1,
            MetricKind::NetworkConnections => 2,
            MetricKind::OpenFiles => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "CPU",
            MetricKind::Memory => "MEM",
            MetricKind::NetworkConnections => "NET",
            MetricKind::OpenFiles => "FILES",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One tick's reading for one metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Value(f64),
    /// The probe could not read the value this tick
    Failed,
}

impl Sample {
    /// Raw value used for a failed reading
    pub const SENTINEL: f64 = -1.0;

    pub fn value(&self) -> Option<f64> {
        match self {
            Sample::Value(v) => Some(*v),
            Sample::Failed => None,
        }
    }

    pub fn raw(&self) -> f64 {
        self.value().unwrap_or(Self::SENTINEL)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Sample::Failed)
    }
}

impl From<Option<f64>> for Sample {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Sample::Value(v),
            _ => Sample::Failed,
        }
    }
}

/// Bounded newest-first sequence of samples
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl MetricSeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend the newest sample, evicting from the tail when over capacity
    pub fn push(&mut self, sample: Sample) {
        self.samples.push_front(sample);
        self.samples.truncate(self.capacity);
    }

    pub fn latest(&self) -> Option<Sample> {
        self.samples.front().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Largest successful value in the history
    pub fn peak(&self) -> Option<f64> {
        self.samples.iter().filter_map(Sample::value).reduce(f64::max)
    }
}

/// Cosmetic scale factor dividing a metric's natural maximum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomConfig {
    factor: f64,
}

impl ZoomConfig {
    /// Returns `None` for non-positive or non-finite factors
    pub fn new(factor: f64) -> Option<Self> {
        (factor.is_finite() && factor > 0.0).then_some(Self { factor })
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn ceiling(&self, natural_max: f64) -> f64 {
        natural_max / self.factor
    }

    /// Next level in `ZOOM_STEPS`, wrapping back to 1.0x
    pub fn step(&self) -> Self {
        let next = ZOOM_STEPS
            .iter()
            .copied()
            .find(|s| *s > self.factor)
            .unwrap_or(ZOOM_STEPS[0]);
        Self { factor: next }
    }
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self { factor: 1.0 }
    }
}

/// Everything the renderer needs for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    pub process_label: String,
    pub pid: u32,
    pub series: [MetricSeries; 4],
    pub zoom: [ZoomConfig; 4],
    /// Fixed ceilings per metric; `None` autoscales to the history peak
    pub natural_max: [Option<f64>; 4],
    pub width: u16,
    pub height: u16,
    pub interval: Duration,
    pub exited: bool,
}

impl DashboardSnapshot {
    pub fn series(&self, kind: MetricKind) -> &MetricSeries {
        &self.series[kind.index()]
    }

    pub fn zoom(&self, kind: MetricKind) -> ZoomConfig {
        self.zoom[kind.index()]
    }

    /// Natural maximum, falling back to the history peak (at least 1)
    pub fn effective_max(&self, kind: MetricKind) -> f64 {
        self.natural_max[kind.index()]
            .filter(|m| *m > 0.0)
            .or_else(|| self.series(kind).peak())
            .unwrap_or(1.0)
            .max(1.0)
    }

    /// Display ceiling after zoom
    pub fn display_max(&self, kind: MetricKind) -> f64 {
        self.zoom(kind).ceiling(self.effective_max(kind))
    }

    pub fn with_size(mut self, width: u16, height: u16) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// Four metric histories plus their display configuration
#[derive(Debug, Clone)]
pub struct HistoryStore {
    process_label: String,
    pid: u32,
    series: [MetricSeries; 4],
    zoom: [ZoomConfig; 4],
    initial_zoom: [ZoomConfig; 4],
    natural_max: [Option<f64>; 4],
    interval: Duration,
    exited: bool,
}

impl HistoryStore {
    pub fn new(process_label: impl Into<String>, pid: u32, capacity: usize, interval: Duration) -> Self {
        Self {
            process_label: process_label.into(),
            pid,
            series: std::array::from_fn(|_| MetricSeries::new(capacity)),
            zoom: [ZoomConfig::default(); 4],
            initial_zoom: [ZoomConfig::default(); 4],
            natural_max: [None; 4],
            interval,
            exited: false,
        }
    }

    /// Zoom the store starts with and returns to on reset
    pub fn with_zoom(mut self, zoom: [ZoomConfig; 4]) -> Self {
        self.zoom = zoom;
        self.initial_zoom = zoom;
        self
    }

    pub fn with_natural_max(mut self, natural_max: [Option<f64>; 4]) -> Self {
        self.natural_max = natural_max;
        self
    }

    pub fn push(&mut self, kind: MetricKind, sample: Sample) {
        self.series[kind.index()].push(sample);
    }

    pub fn series(&self, kind: MetricKind) -> &MetricSeries {
        &self.series[kind.index()]
    }

    pub fn set_zoom(&mut self, kind: MetricKind, zoom: ZoomConfig) {
        self.zoom[kind.index()] = zoom;
    }

    pub fn step_zoom(&mut self, kind: MetricKind) {
        let i = kind.index();
        self.zoom[i] = self.zoom[i].step();
    }

    pub fn reset_zoom(&mut self) {
        self.zoom = self.initial_zoom;
    }

    pub fn mark_exited(&mut self) {
        self.exited = true;
    }

    pub fn is_exited(&self) -> bool {
        self.exited
    }

    pub fn snapshot(&self, (width, height): (u16, u16)) -> DashboardSnapshot {
        DashboardSnapshot {
            process_label: self.process_label.clone(),
            pid: self.pid,
            series: self.series.clone(),
            zoom: self.zoom,
            natural_max: self.natural_max,
            width,
            height,
            interval: self.interval,
            exited: self.exited,
        }
    }
}
