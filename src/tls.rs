use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no certificate found in {}", .0.display())]
    NoCertificate(PathBuf),
    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),
    #[error("certificate and key rejected: {0}")]
    Config(#[from] rustls::Error),
}

/// Certificate chain and key, loaded once at startup and shared by every TLS
/// connection.
#[derive(Debug, Clone)]
pub struct CertificateBundle {
    pub chain_path: PathBuf,
    pub key_path: PathBuf,
    pub config: Arc<ServerConfig>,
}

impl CertificateBundle {
    pub fn load(chain_path: &Path, key_path: &Path) -> Result<Self, TlsError> {
        let certs = load_certs(chain_path)?;
        let key = load_private_key(key_path)?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        log::info!(
            "Loaded TLS certificate {} with key {}",
            chain_path.display(),
            key_path.display()
        );

        Ok(Self {
            chain_path: chain_path.to_path_buf(),
            key_path: key_path.to_path_buf(),
            config: Arc::new(config),
        })
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Open {
            path: path.to_path_buf(),
            source,
        })
}

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificate(path.to_path_buf()));
    }
    log::debug!("Read {} certificate(s) from {}", certs.len(), path.display());
    Ok(certs)
}

pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|source| TlsError::Parse {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}
