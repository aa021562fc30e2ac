use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error as ThisError;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tracing::warn;

#[derive(Debug, ThisError, PartialEq)]
pub enum ListenError {
    #[error("listen address is not set")]
    Empty,
    #[error("unacceptable scheme in '{0}', only 'tcp' and 'unix' are permitted")]
    UnsupportedScheme(String),
    #[error("listen address '{0}' has no host or path")]
    MissingAddress(String),
}

/// Where to accept clients: `tcp://host:port` or `unix:///path/to/socket`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenAddress {
    Tcp(String),
    Unix(PathBuf),
}

impl FromStr for ListenAddress {
    type Err = ListenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.is_empty() {
            return Err(ListenError::Empty);
        }

        let (scheme, rest) = value
            .split_once("://")
            .ok_or_else(|| ListenError::UnsupportedScheme(value.to_string()))?;

        match scheme {
            "tcp" => {
                let host = rest.trim_end_matches('/');
                if host.is_empty() {
                    return Err(ListenError::MissingAddress(value.to_string()));
                }
                Ok(ListenAddress::Tcp(host.to_string()))
            }
            "unix" => {
                if rest.is_empty() {
                    return Err(ListenError::MissingAddress(value.to_string()));
                }
                Ok(ListenAddress::Unix(PathBuf::from(rest)))
            }
            _ => Err(ListenError::UnsupportedScheme(value.to_string())),
        }
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddress::Tcp(address) => write!(f, "tcp://{}", address),
            ListenAddress::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

impl ListenAddress {
    pub async fn bind(&self) -> io::Result<Listener> {
        match self {
            ListenAddress::Tcp(address) => Ok(Listener::Tcp(TcpListener::bind(address).await?)),
            #[cfg(unix)]
            ListenAddress::Unix(path) => Ok(Listener::Unix {
                listener: UnixListener::bind(path)?,
                path: path.clone(),
            }),
            #[cfg(not(unix))]
            ListenAddress::Unix(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not available on this platform",
            )),
        }
    }
}

/// Anything a connection can be served over.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: UnixListener,
        path: PathBuf,
    },
}

impl Listener {
    /// Accepts the next client, labelled by its remote address.
    pub async fn accept(&self) -> io::Result<(Box<dyn Stream>, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, address) = listener.accept().await?;
                // Responses are flushed once per request, there is nothing to coalesce.
                stream.set_nodelay(true)?;
                Ok((Box::new(stream), address.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix { listener, path } => {
                let (stream, address) = listener.accept().await?;
                let label = match address.as_pathname() {
                    Some(peer) => peer.display().to_string(),
                    None => format!("unix:{}", path.display()),
                };
                Ok((Box::new(stream), label))
            }
        }
    }

    pub fn local_addr(&self) -> String {
        match self {
            Listener::Tcp(listener) => match listener.local_addr() {
                Ok(address) => format!("tcp://{}", address),
                Err(_) => "tcp://<unknown>".to_string(),
            },
            #[cfg(unix)]
            Listener::Unix { path, .. } => format!("unix://{}", path.display()),
        }
    }

    /// Removes the socket file of a unix listener.
    pub fn cleanup(self) {
        match self {
            Listener::Tcp(_) => {}
            #[cfg(unix)]
            Listener::Unix { listener, path } => {
                drop(listener);
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove the socket file");
                }
            }
        }
    }
}
