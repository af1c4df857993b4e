//! Service layer: file storage, activity logging, phase materialization

pub mod activity;
pub mod materializer;
pub mod storage;

pub use activity::ActivityLogger;
pub use materializer::{MaterializeOutcome, PhaseMaterializer, UploadedFile};
pub use storage::FileStorage;
