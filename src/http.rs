use std::io::{self, BufRead, Read, Write};
use std::time::SystemTime;

pub const MAX_HEAD_BYTES: usize = 16 * 1024;
pub const MAX_HEADERS: usize = 100;
pub const SERVER_NAME: &str = concat!("cratesfyi-web/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn host(&self) -> Option<&str> {
        self.header("host")
    }

    pub fn is_head(&self) -> bool {
        self.method == "HEAD"
    }

    /// Path plus query of the target. Absolute-form targets
    /// (`http://host/path`) are reduced to their path; origin-form targets
    /// are returned as-is even when `://` appears in their path or query.
    pub fn path_and_query(&self) -> &str {
        let target = self.target.as_str();
        let target = match strip_http_scheme(target) {
            Some(rest) => match rest.find(|c: char| c == '/' || c == '?') {
                Some(start) => &rest[start..],
                None => "",
            },
            None => target,
        };
        if target.is_empty() {
            "/"
        } else {
            target
        }
    }

    pub fn path(&self) -> &str {
        let pq = self.path_and_query();
        pq.split('?').next().unwrap_or(pq)
    }

    pub fn query(&self) -> Option<&str> {
        self.path_and_query().split_once('?').map(|(_, q)| q)
    }
}

/// Remainder of an absolute-form target after `http://` or `https://`
/// (scheme matched case-insensitively).
fn strip_http_scheme(target: &str) -> Option<&str> {
    ["http://", "https://"].iter().find_map(|scheme| {
        target
            .get(..scheme.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
            .map(|_| &target[scheme.len()..])
    })
}

/// Reads one request head (request line plus headers) from `reader`.
///
/// Returns `Ok(None)` when the peer closed the connection before sending
/// anything, and `InvalidData` for heads that are malformed or too large.
pub fn read_request<R: BufRead>(reader: &mut R) -> io::Result<Option<Request>> {
    let mut consumed = 0;
    let mut first_line = String::new();
    consumed += read_limited_line(reader, &mut first_line, consumed)?;
    if consumed == 0 {
        return Ok(None);
    }

    let mut parts = first_line.split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next())
    {
        (Some(m), Some(t), Some(v), None) if v.starts_with("HTTP/") => (m, t, v),
        _ => return Err(invalid(format!("bad request line: {}", first_line.trim()))),
    };

    let mut headers = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        let read = read_limited_line(reader, &mut line, consumed)?;
        consumed += read;
        if read == 0 || line.trim().is_empty() {
            break;
        }
        log::trace!("Header line: {}", line.trim());
        if headers.len() == MAX_HEADERS {
            return Err(invalid("too many headers"));
        }
        match line.split_once(':') {
            Some((name, value)) => {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
            None => return Err(invalid(format!("bad header line: {}", line.trim()))),
        }
    }

    Ok(Some(Request {
        method: method.to_string(),
        target: target.to_string(),
        version: version.to_string(),
        headers,
    }))
}

fn read_limited_line<R: BufRead>(
    reader: &mut R,
    line: &mut String,
    consumed: usize,
) -> io::Result<usize> {
    let remaining = MAX_HEAD_BYTES.saturating_sub(consumed) as u64;
    let read = reader.by_ref().take(remaining + 1).read_line(line)?;
    if consumed + read > MAX_HEAD_BYTES {
        return Err(invalid("request head too large"));
    }
    Ok(read)
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn bad_request() -> Self {
        Self::new(400)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(405).with_header("Allow", "GET, HEAD")
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_body(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.headers
            .push(("Content-Type".to_string(), content_type.to_string()));
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialises the response. `Content-Length` always reflects the body,
    /// which is omitted for `HEAD`.
    pub fn write_to<W: Write>(
        &self,
        out: &mut W,
        head_only: bool,
        now: SystemTime,
    ) -> io::Result<()> {
        write!(out, "HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status))?;
        write!(out, "Server: {}\r\n", SERVER_NAME)?;
        write!(out, "Date: {}\r\n", httpdate::fmt_http_date(now))?;
        for (name, value) in &self.headers {
            write!(out, "{}: {}\r\n", name, value)?;
        }
        write!(out, "Content-Length: {}\r\n", self.body.len())?;
        out.write_all(b"Connection: close\r\n\r\n")?;
        if !head_only {
            out.write_all(&self.body)?;
        }
        out.flush()
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        301 => "Moved Permanently",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(raw: &str) -> io::Result<Option<Request>> {
        read_request(&mut Cursor::new(raw.as_bytes().to_vec()))
    }

    #[test]
    fn parses_request_head() {
        let raw = "GET /a/b?q=1 HTTP/1.1\r\nHost: crates.fyi\r\nAccept-Encoding: gzip\r\n\r\n";
        let req = parse(raw).unwrap().unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path(), "/a/b");
        assert_eq!(req.query(), Some("q=1"));
        assert_eq!(req.host(), Some("crates.fyi"));
        assert_eq!(req.header("ACCEPT-ENCODING"), Some("gzip"));
    }

    #[test]
    fn empty_connection_yields_none() {
        assert!(parse("").unwrap().is_none());
    }

    #[test]
    fn malformed_heads_are_rejected() {
        for raw in [
            "GET\r\n\r\n",
            "GET / FTP/1.0\r\n\r\n",
            "GET / HTTP/1.1 extra\r\n\r\n",
            "GET / HTTP/1.1\r\nno colon here\r\n\r\n",
        ] {
            let err = parse(raw).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidData, "{raw:?}");
        }
    }

    #[test]
    fn oversized_heads_are_rejected() {
        let raw = format!("GET / HTTP/1.1\r\nX-Big: {}\r\n\r\n", "a".repeat(MAX_HEAD_BYTES));
        assert_eq!(parse(&raw).unwrap_err().kind(), io::ErrorKind::InvalidData);

        let many: String = (0..=MAX_HEADERS).map(|i| format!("X-{i}: v\r\n")).collect();
        let raw = format!("GET / HTTP/1.1\r\n{many}\r\n");
        assert_eq!(parse(&raw).unwrap_err().kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn absolute_form_targets_reduce_to_path() {
        let mut req = parse("GET http://crates.fyi/x?y HTTP/1.1\r\n\r\n").unwrap().unwrap();
        assert_eq!(req.path_and_query(), "/x?y");
        req.target = "http://crates.fyi".to_string();
        assert_eq!(req.path_and_query(), "/");
        req.target = "http://crates.fyi?z".to_string();
        assert_eq!(req.path_and_query(), "?z");
        req.target = "HTTPS://crates.fyi/a/b".to_string();
        assert_eq!(req.path_and_query(), "/a/b");
    }

    #[test]
    fn urls_inside_origin_form_targets_are_kept() {
        let mut req = parse("GET /search?url=https://github.com/x HTTP/1.1\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(req.path_and_query(), "/search?url=https://github.com/x");
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query(), Some("url=https://github.com/x"));

        req.target = "/index.html?ref=http://x/data.json".to_string();
        assert_eq!(req.path(), "/index.html");

        req.target = "/mirror/http://example.com/".to_string();
        assert_eq!(req.path(), "/mirror/http://example.com/");
    }

    #[test]
    fn response_serialization() {
        let resp = Response::new(200).with_body("text/plain", b"hi".to_vec());
        let now = SystemTime::UNIX_EPOCH;

        let mut full = Vec::new();
        resp.write_to(&mut full, false, now).unwrap();
        let text = String::from_utf8(full).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Date: Thu, 01 Jan 1970 00:00:00 GMT\r\n"));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.ends_with("\r\n\r\nhi"));

        let mut head = Vec::new();
        resp.write_to(&mut head, true, now).unwrap();
        let text = String::from_utf8(head).unwrap();
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
