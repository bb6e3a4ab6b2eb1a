//! Sample index codec, fMP4 ingest reader, and DTS/index math for reel
//! source assets.

pub mod codec;
pub mod error;
pub mod model;
pub mod reader;
pub mod timing;

pub use error::{Error, Result};
pub use model::{AudioParams, Esd, MediaIndex, MediaKind, Sample, Subtype, Track, VideoParams};
pub use reader::{read_bytes, Reader};
