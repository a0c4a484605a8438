use clap::Parser;
use std::path::PathBuf;

/// Static documentation server for crates.fyi.
///
/// Every flag defaults to the production rule set, so running the binary
/// without arguments serves the live site.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Canonical host name. `www.<domain>` is redirected here.
    #[arg(short, long, default_value = "crates.fyi")]
    pub domain: String,

    /// Document root served on the canonical HTTPS host
    #[arg(short, long, default_value = "/home/cratesfyi/public_html")]
    pub root: PathBuf,

    /// PEM certificate chain
    #[arg(long, default_value = "/etc/letsencrypt/live/crates.fyi/fullchain.pem")]
    pub cert: PathBuf,

    /// PEM private key
    #[arg(long, default_value = "/etc/letsencrypt/live/crates.fyi/privkey.pem")]
    pub key: PathBuf,

    /// Plain HTTP listen addresses (repeatable)
    #[arg(long, default_values = ["[::]:80", "0.0.0.0:80"])]
    pub http_listen: Vec<String>,

    /// HTTPS listen addresses (repeatable)
    #[arg(long, default_values = ["[::]:443", "0.0.0.0:443"])]
    pub https_listen: Vec<String>,

    #[arg(short, long, default_value = "9")]
    pub gzip_level: u32,

    /// Bodies shorter than this are sent uncompressed
    #[arg(long, default_value = "20")]
    pub gzip_min_length: usize,

    /// Expiry applied to html, htm, js, css and woff responses
    #[arg(long, default_value = "3d")]
    pub expires: humantime::Duration,

    /// Disable the generated directory listing
    #[arg(long)]
    pub no_listing: bool,

    /// Per-connection read/write timeout
    #[arg(long, default_value = "30s")]
    pub timeout: humantime::Duration,
}

impl Args {
    pub fn www_domain(&self) -> String {
        format!("www.{}", self.domain)
    }
}
