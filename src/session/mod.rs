pub mod controller;
pub mod state;

pub use controller::{CaptureController, CaptureOutcome, QuerySink};
pub use state::{CaptureSession, SessionEvent, SessionState};
