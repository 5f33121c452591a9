pub mod decoder;
pub mod frame;
pub mod planes;
pub mod raster;
pub mod synthetic;

pub use decoder::FrameTransformer;
pub use frame::{PackedFrame, Plane, RawFrame, Rotation};
pub use planes::{pack_frame, pack_planes};
pub use raster::{DecodedImage, LatestRaster, RasterLedger};
pub use synthetic::{ChromaLayout, SyntheticCamera};
