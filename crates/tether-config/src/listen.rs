use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// TCP address the debugger-side server listens on.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ListenAddress {
    /// Host or IP literal to bind.
    pub host: String,
    /// Preferred port. The server scans forward when it is taken.
    pub port: u16,
}

impl ListenAddress {
    /// Builds a listen address.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host or IP literal to bind.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Preferred port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "tcp://{}:{}", self.host, self.port)
    }
}

/// Optional allow-filter applied to the peer address of accepted clients.
///
/// An empty filter admits every peer. A configured filter admits a peer when
/// the filter text occurs in the textual form of the peer IP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpFilter(Option<Ipv4Addr>);

impl IpFilter {
    /// Filter that admits every peer.
    #[must_use]
    pub const fn any() -> Self {
        Self(None)
    }

    /// Parses operator input.
    ///
    /// Empty input, `any` and `0.0.0.0` clear the filter.
    pub fn parse(input: &str) -> Result<Self, IpFilterParseError> {
        let trimmed = input.trim().to_ascii_lowercase();
        if trimmed.is_empty() || trimmed == "any" || trimmed == "0.0.0.0" {
            return Ok(Self::any());
        }
        trimmed
            .parse::<Ipv4Addr>()
            .map(|addr| Self(Some(addr)))
            .map_err(|_| IpFilterParseError::InvalidAddress(input.to_owned()))
    }

    /// Returns the configured address, if any.
    #[must_use]
    pub const fn address(&self) -> Option<Ipv4Addr> {
        self.0
    }

    /// Returns `true` when the filter admits the given peer.
    #[must_use]
    pub fn admits(&self, peer: IpAddr) -> bool {
        match self.0 {
            None => true,
            Some(filter) => peer.to_string().contains(&filter.to_string()),
        }
    }
}

impl fmt::Display for IpFilter {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(addr) => write!(formatter, "{addr}"),
            None => formatter.write_str("any"),
        }
    }
}

impl FromStr for IpFilter {
    type Err = IpFilterParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

/// Errors raised while parsing an [`IpFilter`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IpFilterParseError {
    /// The text is neither a clearing keyword nor a dotted-quad address.
    #[error("'{0}' is not an IPv4 address in XXX.XXX.XXX.XXX form")]
    InvalidAddress(String),
}
