#![warn(future_incompatible, nonstandard_style, rust_2018_idioms, unused)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::similar_names,
    clippy::cast_possible_truncation,
    clippy::too_many_lines
)]

mod client;
mod enums;
mod error;
mod flags;
mod frame;
pub mod h1;
mod hpack;
mod input;
mod output;
mod request;
mod response;
mod runtime;
mod server;
mod session;
mod stream;
mod types;

pub use bytes::Bytes;
pub use client::{Client, ClientConfig};
pub use error::Error;
pub use request::{Method, Request};
pub use response::Response;
pub use server::{Server, ServerConfig};
pub use session::{Handler, HandlerFuture};
pub use url::Url;
