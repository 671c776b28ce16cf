//! readeasy: read documents aloud and transform them through an AI proxy.
//!
//! - [`speech`]: voice catalog, voice selection and the playback state machine
//! - [`transform`]: summarize / simplify / translate client
//! - [`service`]: event loop tying both to a [`document::Document`]

pub mod config;
pub mod document;
pub mod error;
pub mod prefs;
pub mod service;
pub mod speech;
pub mod transform;

pub use config::Config;
pub use document::Document;
pub use error::{ReadEasyError, Result};
pub use service::{ReaderCommand, ReaderNotice, ReaderService};
