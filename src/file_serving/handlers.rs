use mime_guess::from_path;
use std::fs;
use std::io;
use std::path::Path;
use std::time::{Instant, SystemTime};

use super::listing::render_listing;
use super::path_utils::resolve;
use super::{Resolved, ServeOptions};
use crate::compression::{determine_compression, is_compressible_type, CompressionType};
use crate::http::{Request, Response};
use crate::logging::LoggingExt;
use crate::redirect;

pub fn content_type_for(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let essence = match ext.as_deref() {
        Some("js") | Some("mjs") => "application/javascript".to_string(),
        _ => from_path(path).first_or_octet_stream().to_string(),
    };

    if essence.starts_with("text/") || essence == "application/javascript" {
        format!("{}; charset=utf-8", essence)
    } else {
        essence
    }
}

/// Serves a GET/HEAD request for `request` out of `base_dir`.
pub fn serve_file(
    base_dir: &Path,
    request: &Request,
    options: &ServeOptions,
    now: SystemTime,
) -> io::Result<Response> {
    let start_time = Instant::now();
    let request_path = request.path();
    log::debug!("Serving {} from {}", request_path, base_dir.display());

    let (content, content_type, cached_path, last_modified) =
        match resolve(base_dir, request_path, options.listing)? {
            Resolved::NotFound => {
                log::debug!("Not found: {}", request_path);
                return Ok(Response::not_found());
            }
            Resolved::AddSlash => {
                // Exactly one leading slash: `//host/` would leave the site
                let trimmed = request_path.trim_start_matches(|c: char| c == '/' || c == '\\');
                let mut location = if trimmed.is_empty() {
                    "/".to_string()
                } else {
                    format!("/{}/", trimmed)
                };
                if let Some(query) = request.query() {
                    location.push('?');
                    location.push_str(query);
                }
                return Ok(redirect::permanent(&location));
            }
            Resolved::Listing(dir) => {
                let html =
                    dir.log_operation("render_listing", || render_listing(&dir, request_path))?;
                (
                    html.into_bytes(),
                    "text/html; charset=utf-8".to_string(),
                    None,
                    None,
                )
            }
            Resolved::File(path) => {
                let content = path.as_path().log_operation("read", || fs::read(&path))?;
                let modified = fs::metadata(&path).and_then(|m| m.modified()).ok();
                let content_type = content_type_for(&path);
                (content, content_type, Some(path), modified)
            }
        };

    let cache_headers = cached_path
        .as_deref()
        .map(|p| options.cache.headers_for(p, now))
        .unwrap_or_default();

    let accepted = determine_compression(request.header("accept-encoding").unwrap_or(""));
    let compression = options.compression.choose(
        accepted,
        &content_type,
        content.len(),
        request.header("via").is_some(),
        !cache_headers.is_empty(),
    );

    let original_size = content.len();
    let body = match compression {
        CompressionType::Gzip => {
            log::debug!("Compressing with gzip level {}", options.compression.gzip_level);
            options.compression.gzip(&content)?
        }
        CompressionType::None => content,
    };

    let mut response = Response::new(200).with_body(&content_type, body);
    if let Some(encoding) = compression.content_encoding() {
        response = response.with_header("Content-Encoding", encoding);
    }
    if is_compressible_type(&content_type) {
        response = response.with_header("Vary", "Accept-Encoding");
    }
    if let Some(modified) = last_modified {
        response = response.with_header("Last-Modified", httpdate::fmt_http_date(modified));
    }
    response.headers.extend(cache_headers);

    log::debug!(
        "Prepared {} in {:?} - Size: {} → {}",
        request_path,
        start_time.elapsed(),
        original_size,
        response.body.len()
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::time::Duration;
    use tempfile::TempDir;

    const PAGE: &str = "<!DOCTYPE html><html><body><h1>serde 1.0.0</h1></body></html>";

    fn docroot() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), PAGE).unwrap();
        fs::write(dir.path().join("styles.css"), "body { margin: 0 auto; padding: 1em; }").unwrap();
        fs::write(dir.path().join("data.json"), r#"{"crates": ["serde", "rand", "log"]}"#)
            .unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "pub fn f() {}").unwrap();
        dir
    }

    fn get(target: &str, headers: &[(&str, &str)]) -> Request {
        Request {
            method: "GET".to_string(),
            target: target.to_string(),
            version: "HTTP/1.1".to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn serve(dir: &TempDir, request: &Request) -> Response {
        serve_file(dir.path(), request, &ServeOptions::default(), SystemTime::now()).unwrap()
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for(Path::new("a.html")), "text/html; charset=utf-8");
        assert_eq!(content_type_for(Path::new("a.JS")), "application/javascript; charset=utf-8");
        assert_eq!(content_type_for(Path::new("a.json")), "application/json");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn index_is_served_and_compressed() {
        let dir = docroot();
        let resp = serve(&dir, &get("/", &[("Accept-Encoding", "gzip, br")]));

        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("Content-Encoding"), Some("gzip"));
        assert_eq!(resp.header("Vary"), Some("Accept-Encoding"));
        assert_eq!(resp.header("Cache-Control"), Some("max-age=259200"));
        assert!(resp.header("Last-Modified").is_some());

        let mut decoded = String::new();
        GzDecoder::new(&resp.body[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, PAGE);
    }

    #[test]
    fn index_without_gzip_support_is_identity() {
        let dir = docroot();
        let resp = serve(&dir, &get("/index.html", &[]));
        assert_eq!(resp.header("Content-Encoding"), None);
        assert_eq!(resp.body, PAGE.as_bytes());
    }

    #[test]
    fn json_is_never_compressed_nor_expired() {
        let dir = docroot();
        let resp = serve(&dir, &get("/data.json", &[("Accept-Encoding", "gzip")]));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("Content-Encoding"), None);
        assert_eq!(resp.header("Vary"), None);
        assert_eq!(resp.header("Expires"), None);
        assert_eq!(resp.header("Cache-Control"), None);
    }

    #[test]
    fn css_expires_in_three_days() {
        let dir = docroot();
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_800_000_000);
        let resp = serve_file(
            dir.path(),
            &get("/styles.css", &[]),
            &ServeOptions::default(),
            now,
        )
        .unwrap();
        let expires = httpdate::parse_http_date(resp.header("Expires").unwrap()).unwrap();
        assert_eq!(
            expires.duration_since(now).unwrap(),
            Duration::from_secs(3 * 24 * 3600)
        );
    }

    #[test]
    fn proxied_requests_compress_only_cacheable_responses() {
        let dir = docroot();
        let headers = [("Accept-Encoding", "gzip"), ("Via", "1.1 varnish")];

        let css = serve(&dir, &get("/styles.css", &headers));
        assert_eq!(css.header("Content-Encoding"), Some("gzip"));

        let listing = serve(&dir, &get("/src/", &headers));
        assert_eq!(listing.header("Content-Encoding"), None);
    }

    #[test]
    fn listing_and_slash_redirect() {
        let dir = docroot();
        let redirect = serve(&dir, &get("/src?x=1", &[]));
        assert_eq!(redirect.status, 301);
        assert_eq!(redirect.header("Location"), Some("/src/?x=1"));

        let listing = serve(&dir, &get("/src/", &[]));
        assert_eq!(listing.status, 200);
        assert_eq!(listing.header("Expires"), None);
        let html = String::from_utf8(listing.body).unwrap();
        assert!(html.contains("href=\"lib.rs\""));
    }

    #[test]
    fn slash_redirect_never_points_off_site() {
        let dir = docroot();
        for target in ["//src", "///src?x=1", "/\\src"] {
            let resp = serve(&dir, &get(target, &[]));
            if resp.status == 301 {
                let location = resp.header("Location").unwrap();
                assert!(location.starts_with("/src/"), "{target} -> {location}");
                assert!(!location.starts_with("//"), "{target} -> {location}");
            }
        }
        let resp = serve(&dir, &get("//src", &[]));
        assert_eq!(resp.status, 301);
        assert_eq!(resp.header("Location"), Some("/src/"));

        let root = serve(&dir, &get("?z", &[]));
        assert_eq!(root.status, 301);
        assert_eq!(root.header("Location"), Some("/?z"));
    }

    #[test]
    fn missing_file_is_404_with_empty_body() {
        let dir = docroot();
        let resp = serve(&dir, &get("/nonexistent.file", &[]));
        assert_eq!(resp.status, 404);
        assert!(resp.body.is_empty());
    }
}
