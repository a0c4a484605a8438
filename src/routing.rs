use std::fmt;
use std::path::PathBuf;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Scheme {
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Action {
    /// Permanent redirect to this origin, keeping path and query.
    Redirect(String),
    Serve(PathBuf),
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct VirtualHostRule {
    pub domain: String,
    pub scheme: Scheme,
    pub action: Action,
}

#[derive(Debug, Clone)]
pub struct Router {
    rules: Vec<VirtualHostRule>,
}

impl Router {
    pub fn new(rules: Vec<VirtualHostRule>) -> Self {
        Self { rules }
    }

    /// The rule table for a documentation site: `www.<domain>` and plain
    /// HTTP `<domain>` redirect to `https://<domain>`, which serves `root`.
    pub fn for_site(domain: &str, root: PathBuf) -> Self {
        let domain = domain.to_ascii_lowercase();
        let canonical = format!("https://{}", domain);
        let www = format!("www.{}", domain);

        let redirect = |host: &str, scheme| VirtualHostRule {
            domain: host.to_string(),
            scheme,
            action: Action::Redirect(canonical.clone()),
        };

        Self::new(vec![
            redirect(&www, Scheme::Http),
            redirect(&www, Scheme::Https),
            redirect(&domain, Scheme::Http),
            VirtualHostRule {
                domain,
                scheme: Scheme::Https,
                action: Action::Serve(root),
            },
        ])
    }

    pub fn rules(&self) -> &[VirtualHostRule] {
        &self.rules
    }

    pub fn route(&self, host: Option<&str>, scheme: Scheme) -> Option<&VirtualHostRule> {
        let host = normalize_host(host?);
        let rule = self
            .rules
            .iter()
            .find(|r| r.scheme == scheme && r.domain == host);
        if rule.is_none() {
            log::debug!("No virtual host for {}://{}", scheme, host);
        }
        rule
    }
}

/// Lower-cases a `Host` header value and strips the port and any trailing dot.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let without_port = if host.starts_with('[') {
        // IPv6 literal: keep the brackets, drop what follows `]`
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        }
    };
    without_port.trim_end_matches('.').to_ascii_lowercase()
}
