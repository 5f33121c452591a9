pub mod overlay;

pub use overlay::{project, CoverFit, ViewRect};
