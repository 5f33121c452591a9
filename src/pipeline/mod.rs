pub mod analysis;
pub mod handoff;
pub mod queue;
pub mod throttle;

pub use analysis::{AnalysisShared, AnalysisWorker, FrameOutcome};
pub use handoff::{DetectionHint, LatestHint, OverlayBox, OverlayFrame, OverlayHandoff, ViewSize};
pub use queue::{latest_frame_queue, FrameConsumer, FrameProducer, QueueClosed, QueueStats};
pub use throttle::FrameThrottler;
