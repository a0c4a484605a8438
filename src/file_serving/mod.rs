pub mod handlers;
pub mod listing;
mod path_utils;

use std::path::PathBuf;

use crate::cache::CacheRule;
use crate::compression::CompressionSettings;

/// Index files tried, in order, when a directory is requested.
pub const INDEX_FILES: &[&str] = &["index.html", "index.htm"];

/// Outcome of mapping a request path onto the document root.
#[derive(Debug, PartialEq)]
pub enum Resolved {
    File(PathBuf),
    Listing(PathBuf),
    /// A directory requested without its trailing slash.
    AddSlash,
    NotFound,
}

#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub listing: bool,
    pub cache: CacheRule,
    pub compression: CompressionSettings,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            listing: true,
            cache: CacheRule::default(),
            compression: CompressionSettings::default(),
        }
    }
}
