//! Connection options.

use std::time::Duration;

use no_panic::no_panic;
use url::Url;

use crate::error::Error;

/// Default TCP port of rrdcached.
pub const DEFAULT_PORT: u16 = 42217;

/// Environment variable rrdtool uses to locate the daemon.
pub const ADDRESS_ENV: &str = "RRDCACHED_ADDRESS";

/// Connection options for rrdcached.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Unix socket path. Takes precedence over `host` when set.
    ///
    /// Default: `None`
    pub socket: Option<String>,

    /// Hostname or IP address.
    ///
    /// Default: `""`
    pub host: String,

    /// Port number of the daemon's TCP listener.
    ///
    /// Default: `42217`
    pub port: u16,

    /// Deadline for establishing the connection.
    ///
    /// Default: `None`
    pub connect_timeout: Option<Duration>,

    /// Deadline for each awaited reply.
    ///
    /// Expiry abandons the wait only; the request keeps its place in the
    /// reply order.
    ///
    /// Default: `None`
    pub command_timeout: Option<Duration>,

    /// Size of the buffer used for each socket read.
    ///
    /// Default: `8192`
    pub read_buffer_size: usize,
}

impl Default for Opts {
    #[no_panic]
    fn default() -> Self {
        Self {
            socket: None,
            host: String::new(),
            port: DEFAULT_PORT,
            connect_timeout: None,
            command_timeout: None,
            read_buffer_size: 8192,
        }
    }
}

impl Opts {
    /// Options for a unix socket path.
    pub fn unix(path: impl Into<String>) -> Self {
        Self {
            socket: Some(path.into()),
            ..Self::default()
        }
    }

    /// Read the daemon address from `RRDCACHED_ADDRESS`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if the variable is unset or invalid.
    pub fn from_env() -> Result<Self, Error> {
        let address = std::env::var(ADDRESS_ENV)
            .map_err(|e| Error::InvalidUsage(format!("{ADDRESS_ENV}: {e}")))?;
        Self::try_from(address.as_str())
    }
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a daemon URL.
    ///
    /// Format: `unix:/path/to/socket` or `rrdcached://host[:port]`, each with
    /// optional `?param1=value1&param2=value2`.
    ///
    /// Supported query parameters:
    /// - `connect_timeout_ms`: connect deadline in milliseconds
    /// - `command_timeout_ms`: reply deadline in milliseconds
    /// - `read_buffer_size`: read buffer size in bytes (positive integer)
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        let mut opts = match url.scheme() {
            "unix" => {
                if url.path().is_empty() {
                    return Err(Error::InvalidUsage("unix URL has no socket path".into()));
                }
                Opts::unix(url.path())
            }
            "rrdcached" => Opts {
                host: url.host_str().unwrap_or("localhost").to_string(),
                port: url.port().unwrap_or(DEFAULT_PORT),
                ..Opts::default()
            },
            other => {
                return Err(Error::InvalidUsage(format!(
                    "Invalid scheme: expected 'unix:' or 'rrdcached://', got '{}:'",
                    other
                )));
            }
        };

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "connect_timeout_ms" => {
                    opts.connect_timeout = Some(parse_millis(&key, &value)?);
                }
                "command_timeout_ms" => {
                    opts.command_timeout = Some(parse_millis(&key, &value)?);
                }
                "read_buffer_size" => {
                    opts.read_buffer_size = match value.parse::<usize>() {
                        Ok(n) if n > 0 => n,
                        _ => {
                            return Err(Error::InvalidUsage(format!(
                                "Invalid read_buffer_size: {}",
                                value
                            )));
                        }
                    };
                }
                _ => {
                    return Err(Error::InvalidUsage(format!(
                        "Unknown parameter: {}",
                        key
                    )));
                }
            }
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    /// Parse a daemon address.
    ///
    /// Besides the URL forms accepted by `TryFrom<&Url>`, this accepts the
    /// plain forms rrdtool uses: an absolute socket path (`/run/rrdcached.sock`)
    /// and `host[:port]`.
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidUsage("empty daemon address".into()));
        }
        if s.starts_with('/') {
            return Ok(Opts::unix(s));
        }
        if s.starts_with("unix:") || s.contains("://") {
            let url =
                Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
            return Self::try_from(&url);
        }

        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => {
                let port = port
                    .parse()
                    .map_err(|_| Error::InvalidUsage(format!("Invalid port: {}", port)))?;
                (host, port)
            }
            _ => (s, DEFAULT_PORT),
        };
        Ok(Opts {
            host: host.to_string(),
            port,
            ..Opts::default()
        })
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, Error> {
    value
        .parse()
        .map(Duration::from_millis)
        .map_err(|_| Error::InvalidUsage(format!("Invalid {}: {}", key, value)))
}
