//! Endpoint parsing
//!
//! Supports any absolute URI with an authority:
//! * https://push.example.com:2195
//! * ssl://127.0.0.1:5000/ignored/path
//! * tls://[::1]:8443
//!
//! Only scheme, host and port are kept. The port falls back to the scheme's
//! well-known default (https → 443) when omitted.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;
use url::{Host, Url};

/// Parsed (scheme, host, port) triple identifying the remote TLS server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    scheme: String,
    host: String,
    port: u16,
}

impl Endpoint {
    /// Parse an endpoint string
    pub fn parse(s: &str) -> Result<Self> {
        let url = Url::parse(s.trim())
            .map_err(|e| Error::InvalidEndpoint(format!("'{}': {}", s, e)))?;
        Self::from_url(&url)
    }

    /// Extract scheme, host and port from an already-parsed URL
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => {
                return Err(Error::InvalidEndpoint(format!(
                    "'{}': missing host",
                    url.as_str()
                )))
            }
        };

        let port = url.port_or_known_default().ok_or_else(|| {
            Error::InvalidEndpoint(format!(
                "'{}': missing port and no default for scheme '{}'",
                url.as_str(),
                url.scheme()
            ))
        })?;

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            port,
        })
    }

    /// URI scheme (e.g. `https`)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host name or IP address literal, without IPv6 brackets
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` form, bracketing IPv6 literals
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority())
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Conversion into an [`Endpoint`], accepting strings or already-parsed URLs.
pub trait IntoEndpoint {
    /// Perform the conversion
    fn into_endpoint(self) -> Result<Endpoint>;
}

impl IntoEndpoint for Endpoint {
    fn into_endpoint(self) -> Result<Endpoint> {
        Ok(self)
    }
}

impl IntoEndpoint for &Endpoint {
    fn into_endpoint(self) -> Result<Endpoint> {
        Ok(self.clone())
    }
}

impl IntoEndpoint for &str {
    fn into_endpoint(self) -> Result<Endpoint> {
        Endpoint::parse(self)
    }
}

impl IntoEndpoint for String {
    fn into_endpoint(self) -> Result<Endpoint> {
        Endpoint::parse(&self)
    }
}

impl IntoEndpoint for &String {
    fn into_endpoint(self) -> Result<Endpoint> {
        Endpoint::parse(self)
    }
}

impl IntoEndpoint for Url {
    fn into_endpoint(self) -> Result<Endpoint> {
        Endpoint::from_url(&self)
    }
}

impl IntoEndpoint for &Url {
    fn into_endpoint(self) -> Result<Endpoint> {
        Endpoint::from_url(self)
    }
}
