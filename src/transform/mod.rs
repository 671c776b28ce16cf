//! AI text transforms (summarize, simplify, translate) through the proxy endpoint.

pub mod client;
pub mod languages;

pub use client::{normalize_response, truncate, TextTransformClient, TransformKind, TransformRequest, TransformResult};
pub use languages::{lookup as lookup_language, TranslationLanguage, LANGUAGES};
