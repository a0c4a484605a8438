use flate2::write::GzEncoder;
use flate2::Compression as GzipCompression;
use std::io::{self, Write};

/// Content types eligible for on-the-fly gzip. Parameters such as
/// `charset` are ignored when matching.
pub const COMPRESSIBLE_TYPES: &[&str] = &[
    "text/html",
    "text/plain",
    "text/css",
    "application/javascript",
];

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum CompressionType {
    Gzip,
    None,
}

impl CompressionType {
    pub fn content_encoding(self) -> Option<&'static str> {
        match self {
            CompressionType::Gzip => Some("gzip"),
            CompressionType::None => None,
        }
    }
}

#[derive(Debug, Default, PartialEq, Copy, Clone)]
pub struct AcceptedCompression {
    pub supports_gzip: bool,
}

/// Parses an `Accept-Encoding` header value. `gzip;q=0` is a refusal and `*`
/// counts as gzip unless gzip is listed explicitly.
pub fn determine_compression(accept_encoding: &str) -> AcceptedCompression {
    let mut gzip = None;
    let mut wildcard = None;

    for entry in accept_encoding.split(',') {
        let mut parts = entry.split(';').map(str::trim);
        let coding = parts.next().unwrap_or("").to_ascii_lowercase();
        let acceptable = parts
            .filter_map(|p| p.strip_prefix("q=").or_else(|| p.strip_prefix("Q=")))
            .filter_map(|q| q.trim().parse::<f32>().ok())
            .last()
            .map_or(true, |q| q > 0.0);

        match coding.as_str() {
            "gzip" | "x-gzip" => gzip = Some(acceptable),
            "*" => wildcard = Some(acceptable),
            _ => {}
        }
    }

    AcceptedCompression {
        supports_gzip: gzip.or(wildcard).unwrap_or(false),
    }
}

pub fn is_compressible_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    COMPRESSIBLE_TYPES.contains(&essence.as_str())
}

#[derive(Debug, Clone, Copy)]
pub struct CompressionSettings {
    pub gzip_level: u32,
    pub min_length: usize,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            gzip_level: 9,
            min_length: 20,
        }
    }
}

impl CompressionSettings {
    /// Decides whether a 200 response body gets gzipped.
    ///
    /// `proxied` is true when the request came through an intermediary (it
    /// carries `Via`); such responses are only compressed when they also carry
    /// an explicit expiry the intermediary can cache against.
    pub fn choose(
        &self,
        accepted: AcceptedCompression,
        content_type: &str,
        body_len: usize,
        proxied: bool,
        cacheable: bool,
    ) -> CompressionType {
        if !accepted.supports_gzip
            || !is_compressible_type(content_type)
            || body_len < self.min_length
            || (proxied && !cacheable)
        {
            return CompressionType::None;
        }
        CompressionType::Gzip
    }

    pub fn gzip(&self, content: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), GzipCompression::new(self.gzip_level));
        encoder.write_all(content)?;
        encoder.finish()
    }
}
