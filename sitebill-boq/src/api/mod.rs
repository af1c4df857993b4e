//! HTTP API handlers for sitebill-boq

pub mod boq;
pub mod health;
pub mod phases;
pub mod progress;

pub use boq::boq_routes;
pub use health::health_routes;
pub use phases::phase_routes;
pub use progress::progress_stream;
