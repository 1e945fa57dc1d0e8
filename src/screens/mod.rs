// The monitor has a single screen:
// - Title bar: process name, PID, sampling interval, status, key help
// - 2x2 grid: CPU, Memory, Network connections, Open files
//
// Rendering is driven only by the render task in app.rs.
pub mod dashboard;

pub use dashboard::render;
