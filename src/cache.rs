use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const THREE_DAYS: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// 9999-12-31T23:59:59Z, the last instant an HTTP-date can express.
const LAST_HTTP_DATE_SECS: u64 = 253_402_300_799;

pub fn last_http_date() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(LAST_HTTP_DATE_SECS)
}

/// Explicit expiry for a fixed set of file extensions.
#[derive(Debug, Clone)]
pub struct CacheRule {
    pub extensions: Vec<String>,
    pub max_age: Duration,
}

impl Default for CacheRule {
    fn default() -> Self {
        Self::new(&["html", "htm", "js", "css", "woff"], THREE_DAYS)
    }
}

impl CacheRule {
    pub fn new(extensions: &[&str], max_age: Duration) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            max_age,
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    /// `now + max_age`, or `None` when that is past what an HTTP-date can hold.
    pub fn expiry(&self, now: SystemTime) -> Option<SystemTime> {
        now.checked_add(self.max_age)
            .filter(|expires| *expires <= last_http_date())
    }

    /// `Expires` and `Cache-Control` headers for `path`, relative to `now`.
    /// Empty when the extension is not covered.
    pub fn headers_for(&self, path: &Path, now: SystemTime) -> Vec<(String, String)> {
        if !self.matches(path) {
            return Vec::new();
        }
        let expires = self.expiry(now).unwrap_or_else(last_http_date);
        vec![
            ("Expires".to_string(), httpdate::fmt_http_date(expires)),
            (
                "Cache-Control".to_string(),
                format!("max-age={}", self.max_age.as_secs()),
            ),
        ]
    }
}
