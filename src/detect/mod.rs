pub mod backend;
pub mod client;
pub mod scripted;

pub use backend::{DetectionBox, DetectorBackend};
pub use client::DetectorClient;
pub use scripted::ScriptedBackend;
