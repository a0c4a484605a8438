use crate::http::Response;

/// Builds the `Location` for a permanent redirect to `origin`, keeping the
/// original path and query.
pub fn location(origin: &str, path_and_query: &str) -> String {
    let origin = origin.trim_end_matches('/');
    if path_and_query.starts_with('/') {
        format!("{}{}", origin, path_and_query)
    } else {
        format!("{}/{}", origin, path_and_query)
    }
}

pub fn permanent(location: &str) -> Response {
    let body = format!(
        "<a href=\"{}\">Moved Permanently</a>.\n",
        html_escape(location)
    );
    Response::new(301)
        .with_header("Location", location)
        .with_body("text/html; charset=utf-8", body.into_bytes())
}

pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
