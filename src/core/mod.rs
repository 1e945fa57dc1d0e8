pub mod history;
pub mod probes;
pub mod resolver;
pub mod sampler;

pub use history::{DashboardSnapshot, HistoryStore, MetricKind, MetricSeries, Sample, ZoomConfig};
pub use probes::{NetKind, Probe, SystemProbe};
pub use resolver::{resolve, ProcessHandle, ResolveError};
pub use sampler::{RenderRequest, Sampler, SamplerCommand, SamplerConfig, SamplerReport};
