//! Address argument parsing.
//!
//! Both binaries take one positional address in one of three forms:
//!
//! | Form | Example | Result |
//! |------|---------|--------|
//! | `port` | `5566` | `127.0.0.1:5566` |
//! | `host:port` | `10.0.0.2:5566` | `10.0.0.2:5566` |
//! | `[host]:port` | `[::1]:5566` | `[::1]:5566` |
//!
//! `localhost` maps to the loopback fallback; other names go through the
//! system resolver.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use crate::{Error, Result};

/// Address used when only a port is given.
pub const LOOPBACK_FALLBACK: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// The host part of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    /// A literal IP address.
    Ip(IpAddr),
    /// A host name that still needs resolving.
    Name(String),
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(IpAddr::V6(ip)) => write!(f, "[{ip}]"),
            Self::Ip(ip) => write!(f, "{ip}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// A parsed `host:port` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host to bind to or connect to.
    pub host: Host,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Parses an address argument.
    ///
    /// # Errors
    /// Returns `Error::InvalidAddress` if the input is empty, malformed, or the
    /// port does not fit in 16 bits.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "empty address"));
        }

        if let Some(rest) = trimmed.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| invalid(input, "missing ']'"))?;
            let port = tail
                .strip_prefix(':')
                .ok_or_else(|| invalid(input, "expected ':port' after ']'"))?;
            if host.is_empty() {
                return Err(invalid(input, "empty host"));
            }
            return Ok(Self {
                host: parse_host(host),
                port: parse_port(input, port)?,
            });
        }

        match trimmed.rsplit_once(':') {
            // ":port" behaves like a bare port.
            Some(("", port)) => Ok(Self::loopback(parse_port(input, port)?)),
            Some((host, _)) if host.contains(':') => {
                Err(invalid(input, "IPv6 hosts must be written as [host]:port"))
            }
            Some((host, port)) => Ok(Self {
                host: parse_host(host),
                port: parse_port(input, port)?,
            }),
            None => Ok(Self::loopback(parse_port(input, trimmed)?)),
        }
    }

    /// Creates an endpoint on the loopback fallback address.
    #[must_use]
    pub const fn loopback(port: u16) -> Self {
        Self {
            host: Host::Ip(IpAddr::V4(LOOPBACK_FALLBACK)),
            port,
        }
    }

    /// Resolves the endpoint to a socket address.
    ///
    /// # Errors
    /// Returns `Error::InvalidAddress` if a host name cannot be resolved.
    pub fn resolve(&self) -> Result<SocketAddr> {
        match &self.host {
            Host::Ip(ip) => Ok(SocketAddr::new(*ip, self.port)),
            Host::Name(name) => (name.as_str(), self.port)
                .to_socket_addrs()
                .ok()
                .and_then(|mut addrs| addrs.next())
                .ok_or_else(|| invalid(&self.to_string(), "could not resolve host")),
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

fn parse_host(host: &str) -> Host {
    if host.eq_ignore_ascii_case("localhost") {
        return Host::Ip(IpAddr::V4(LOOPBACK_FALLBACK));
    }
    host.parse::<IpAddr>()
        .map_or_else(|_| Host::Name(host.to_string()), Host::Ip)
}

fn parse_port(input: &str, port: &str) -> Result<u16> {
    let value: u64 = port
        .parse()
        .map_err(|_| invalid(input, "port is not a number"))?;
    u16::try_from(value).map_err(|_| invalid(input, "port value is too big"))
}

fn invalid(input: &str, reason: &'static str) -> Error {
    Error::InvalidAddress {
        input: input.to_string(),
        reason,
    }
}
