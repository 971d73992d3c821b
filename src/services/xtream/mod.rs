//! Xtream Codes Integration
//!
//! Metadata pass-through for the Xtream Player API v2. The relay itself only
//! needs `server/username/password/stream_id`; listings, EPG and detail
//! objects are forwarded to the browser untouched.
//!
//! ```text
//! http://server:port/player_api.php?username=X&password=Y&action=get_live_streams
//! ```

pub mod client;
pub mod types;

pub use client::{build_http_client, XtreamClient, XtreamError};
pub use types::{ListAction, XtreamCredentials, XtreamProxyRequest};
