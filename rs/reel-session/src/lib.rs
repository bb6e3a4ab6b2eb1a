pub mod error;
pub mod id;
pub mod model;
pub mod parse;
pub mod plan;
pub mod registry;

pub use error::{Error, Result};
pub use model::{PlaylistType, Representation, Session, TrackRequest};
pub use parse::{parse, ManifestRequest, RepresentationRequest, TrackRequestInput};
pub use plan::plan as plan_session;
pub use registry::Registry;
