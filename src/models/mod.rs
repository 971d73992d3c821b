pub mod media;
pub mod stream;

pub use media::{FetchProfile, MediaFormat, MediaType};
pub use stream::{StreamRefError, StreamReference};
