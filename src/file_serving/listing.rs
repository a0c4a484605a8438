use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fs;
use std::io;
use std::path::Path;

use crate::redirect::html_escape;

/// Characters left as-is in listing links.
const HREF: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    // Directories sort first
    is_file: bool,
    name: String,
}

fn read_entries(dir: &Path) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                log::debug!("Skipping non UTF-8 entry {:?}", raw);
                continue;
            }
        };
        if name.starts_with('.') {
            continue;
        }
        // Follows symlinks; dangling links are listed as files
        let is_dir = fs::metadata(entry.path())
            .map(|m| m.is_dir())
            .unwrap_or(false);
        entries.push(Entry {
            is_file: !is_dir,
            name,
        });
    }
    entries.sort();
    Ok(entries)
}

/// Renders an HTML index of `dir`, which is served at `url_path` (raw,
/// percent-encoded, ending in `/`).
pub fn render_listing(dir: &Path, url_path: &str) -> io::Result<String> {
    let entries = read_entries(dir)?;
    let display_path = percent_decode_str(url_path).decode_utf8_lossy();
    let title = html_escape(&format!("Index of {}", display_path));

    let mut html = String::with_capacity(512 + entries.len() * 64);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>");
    html.push_str(&title);
    html.push_str("</title>\n</head>\n<body>\n<h1>");
    html.push_str(&title);
    html.push_str("</h1>\n<hr>\n<ul>\n");

    if url_path != "/" {
        html.push_str("<li><a href=\"../\">../</a></li>\n");
    }
    for entry in &entries {
        let suffix = if entry.is_file { "" } else { "/" };
        html.push_str(&format!(
            "<li><a href=\"{}{}\">{}{}</a></li>\n",
            utf8_percent_encode(&entry.name, HREF),
            suffix,
            html_escape(&entry.name),
            suffix
        ));
    }

    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lists_directories_first_and_hides_dotfiles() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("zeta")).unwrap();
        fs::write(dir.path().join("alpha.txt"), "").unwrap();
        fs::write(dir.path().join(".hidden"), "").unwrap();

        let html = render_listing(dir.path(), "/crates/").unwrap();
        assert!(html.contains("<title>Index of /crates/</title>"));
        assert!(html.contains("<a href=\"../\">../</a>"));
        let zeta = html.find("href=\"zeta/\"").unwrap();
        let alpha = html.find("href=\"alpha.txt\"").unwrap();
        assert!(zeta < alpha);
        assert!(!html.contains(".hidden"));
    }

    #[test]
    fn root_listing_has_no_parent_link() {
        let dir = TempDir::new().unwrap();
        let html = render_listing(dir.path(), "/").unwrap();
        assert!(!html.contains("../"));
    }

    #[test]
    fn names_are_escaped_and_encoded() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("<b>&x y.txt"), "").unwrap();

        let html = render_listing(dir.path(), "/a%20b/").unwrap();
        assert!(html.contains("Index of /a b/"));
        assert!(html.contains("href=\"%3Cb%3E%26x%20y.txt\""));
        assert!(html.contains(">&lt;b&gt;&amp;x y.txt</a>"));
    }
}
