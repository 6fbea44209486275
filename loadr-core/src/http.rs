mod client;
mod error;
mod types;
mod wire;

pub use client::HttpClient;
pub use error::{Error, Result};
pub use types::{HttpRequest, HttpResponse, TransportError};
