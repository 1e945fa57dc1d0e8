// Widgets built from ratatui primitives
//
// - trend: per-metric Sparkline with a value/ceiling/zoom title and
//   colour bands (>80% red, >60% yellow)
pub mod trend;
