use rustls::{ServerConfig, ServerConnection, StreamOwned};
use std::io::{self, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;

use crate::args::Args;
use crate::cache::CacheRule;
use crate::compression::CompressionSettings;
use crate::file_serving::handlers::serve_file;
use crate::file_serving::ServeOptions;
use crate::http::{read_request, Request, Response};
use crate::routing::{Action, Router, Scheme};
use crate::tls::{CertificateBundle, TlsError};
use crate::{log_error, log_request, log_response, redirect};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),
    #[error("cannot bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("no {0} listener could be bound")]
    NoListener(Scheme),
    #[error("document root {}: {source}", path.display())]
    DocumentRoot { path: PathBuf, source: io::Error },
    #[error("expiry of {}s reaches past the year 9999", .0.as_secs())]
    Expires(Duration),
}

/// Read-only state shared by every connection thread.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub router: Router,
    pub options: ServeOptions,
    pub timeout: Duration,
}

impl ServerContext {
    pub fn from_args(args: &Args) -> Result<Self, StartupError> {
        let cache = CacheRule {
            max_age: args.expires.into(),
            ..CacheRule::default()
        };
        if cache.expiry(SystemTime::now()).is_none() {
            return Err(StartupError::Expires(cache.max_age));
        }

        Ok(Self {
            router: Router::for_site(&args.domain, args.root.clone()),
            options: ServeOptions {
                listing: !args.no_listing,
                cache,
                compression: CompressionSettings {
                    gzip_level: args.gzip_level.min(9),
                    min_length: args.gzip_min_length,
                },
            },
            timeout: args.timeout.into(),
        })
    }

    /// Maps one parsed request to its response.
    pub fn respond(
        &self,
        scheme: Scheme,
        request: &Request,
        now: SystemTime,
    ) -> io::Result<Response> {
        let rule = match self.router.route(request.host(), scheme) {
            Some(rule) => rule,
            None => return Ok(Response::not_found()),
        };

        match &rule.action {
            Action::Redirect(origin) => Ok(redirect::permanent(&redirect::location(
                origin,
                request.path_and_query(),
            ))),
            Action::Serve(root) => match request.method.as_str() {
                "GET" | "HEAD" => serve_file(root, request, &self.options, now),
                _ => Ok(Response::method_not_allowed()),
            },
        }
    }
}

/// Reads one request from `stream`, answers it and returns.
pub fn handle_connection<S: Read + Write>(
    stream: S,
    scheme: Scheme,
    ctx: &ServerContext,
) -> io::Result<()> {
    let start_time = Instant::now();
    let mut reader = BufReader::new(stream);

    let request = match read_request(&mut reader) {
        Ok(Some(request)) => request,
        Ok(None) => {
            log::debug!("Connection closed before a request was sent");
            return Ok(());
        }
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            log::warn!("Rejecting malformed request: {}", e);
            let response = Response::bad_request();
            response.write_to(reader.get_mut(), false, SystemTime::now())?;
            log_response!(response.status, start_time.elapsed(), 0, 0);
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    log_request!(scheme, request);

    let now = SystemTime::now();
    let response = match ctx.respond(scheme, &request, now) {
        Ok(response) => response,
        Err(e) => {
            log_error!(e, format!("Failed to serve {}", request.target));
            Response::new(500)
        }
    };

    if let Some(location) = response.header("Location") {
        log::debug!("Redirecting {} to {}", request.target, location);
    }
    response.write_to(reader.get_mut(), request.is_head(), now)?;
    let sent = if request.is_head() { 0 } else { response.body.len() };
    log_response!(response.status, start_time.elapsed(), response.body.len(), sent);
    Ok(())
}

fn bind_all(addrs: &[String], scheme: Scheme) -> Result<Vec<TcpListener>, StartupError> {
    let mut listeners = Vec::new();
    for addr in addrs {
        let resolved: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|source| StartupError::Bind {
                addr: addr.clone(),
                source,
            })?
            .collect();

        match TcpListener::bind(&resolved[..]) {
            Ok(listener) => {
                log::info!("Listening on {}://{}", scheme, addr);
                listeners.push(listener);
            }
            // `[::]` is dual-stack on most hosts, so the IPv4 wildcard after it
            // fails with AddrInUse; hosts without IPv6 fail on `[::]` itself.
            Err(e) if resolved.iter().all(|a| a.ip().is_unspecified()) => {
                log::warn!("Skipping wildcard listener {}: {}", addr, e);
            }
            Err(source) => {
                return Err(StartupError::Bind {
                    addr: addr.clone(),
                    source,
                })
            }
        }
    }

    if listeners.is_empty() {
        return Err(StartupError::NoListener(scheme));
    }
    Ok(listeners)
}

fn prepare(stream: &TcpStream, timeout: Duration) -> io::Result<()> {
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    stream.set_nodelay(true)
}

fn accept_loop(
    listener: TcpListener,
    scheme: Scheme,
    ctx: Arc<ServerContext>,
    tls: Option<Arc<ServerConfig>>,
) {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                log_error!(e, "Failed to accept connection");
                continue;
            }
        };
        let ctx = Arc::clone(&ctx);
        let tls = tls.clone();

        thread::spawn(move || {
            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            log::debug!("New {} connection from {}", scheme, peer);

            let result = prepare(&stream, ctx.timeout).and_then(|()| match tls {
                Some(config) => {
                    let conn = ServerConnection::new(config).map_err(io::Error::other)?;
                    let mut tls = StreamOwned::new(conn, stream);
                    handle_connection(&mut tls, scheme, &ctx)?;
                    tls.conn.send_close_notify();
                    tls.flush()
                }
                None => handle_connection(stream, scheme, &ctx),
            });

            if let Err(e) = result {
                match e.kind() {
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                        log::debug!("Connection from {} timed out", peer)
                    }
                    _ => log_error!(e, format!("Error handling connection from {}", peer)),
                }
            }
        });
    }
}

pub fn start_server(args: Args) -> Result<(), StartupError> {
    // Certificates first: nothing is bound if they are unusable
    let bundle = CertificateBundle::load(&args.cert, &args.key)?;

    let root = std::fs::canonicalize(&args.root).map_err(|source| StartupError::DocumentRoot {
        path: args.root.clone(),
        source,
    })?;
    log::info!("Serving {} for https://{}", root.display(), args.domain);
    log::debug!(
        "Certificate {} (key {}) must also cover {}",
        bundle.chain_path.display(),
        bundle.key_path.display(),
        args.www_domain()
    );

    let ctx = Arc::new(ServerContext::from_args(&args)?);
    for rule in ctx.router.rules() {
        log::info!("{}://{} → {:?}", rule.scheme, rule.domain, rule.action);
    }

    let http = bind_all(&args.http_listen, Scheme::Http)?;
    let https = bind_all(&args.https_listen, Scheme::Https)?;

    let mut workers = Vec::new();
    for (listener, scheme, tls) in http
        .into_iter()
        .map(|l| (l, Scheme::Http, None))
        .chain(
            https
                .into_iter()
                .map(|l| (l, Scheme::Https, Some(Arc::clone(&bundle.config)))),
        )
    {
        let ctx = Arc::clone(&ctx);
        workers.push(thread::spawn(move || accept_loop(listener, scheme, ctx, tls)));
    }

    for worker in workers {
        if worker.join().is_err() {
            log::error!("Listener thread panicked");
        }
    }
    Ok(())
}
