//! Transfer engine
//!
//! - [`upload`]: single-request PUT over a duplex connection
//! - [`download`]: temp file, integrity checks, atomic rename
//! - [`digest`]: base64(MD5) as used by Content-MD5
//! - [`progress`]: shared 0..=100 progress handle

pub mod digest;
pub mod download;
pub mod progress;
pub mod response;
pub(crate) mod session;
pub mod upload;

pub use download::{save_to_file, SaveOptions};
pub use progress::Progress;
pub use upload::put_object;
