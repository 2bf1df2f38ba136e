//! gamelink Server - Axum-based HTTP server for device pairing
//!
//! Serves the device-facing JSON API, the browser approval pages and the
//! device credential guard.

pub mod error;
pub mod guard;
pub mod http;
pub mod render;
pub mod state;

pub use error::ApiError;
pub use guard::{DeviceAuth, CREDENTIAL_ID_HEADER, CREDENTIAL_TOKEN_HEADER};
pub use http::create_router;
pub use render::{escape_html, PageRenderer, PairingPage, PlainRenderer};
pub use state::{AppState, SESSION_COOKIE};
