//! Proxy URI construction and normalization.
//!
//! Registry keys and lookups both pass through [`normalize`], so a
//! request matches its registration whatever spelling the client used.
//!
//! Hosts of the form `2001-db8--1.<postfix>` (an IPv6 address with `:`
//! replaced by `-`, below a configured wildcard DNS postfix) name the
//! literal address `[2001:db8::1]`.

use axum::http::Uri;
use std::net::Ipv6Addr;
use thiserror::Error;
use url::{Host, Url};

use crate::config::schema::AddressingConfig;

#[derive(Debug, Error)]
pub enum AddressingError {
    #[error("invalid proxy URI {uri}: {reason}")]
    Invalid { uri: String, reason: String },
}

impl AddressingError {
    fn invalid(uri: impl Into<String>, reason: impl ToString) -> Self {
        AddressingError::Invalid {
            uri: uri.into(),
            reason: reason.to_string(),
        }
    }
}

/// Authority under which the proxy publishes its services.
#[derive(Debug, Clone)]
pub struct ProxyAddressing {
    dns_name: String,
    port: u16,
    wildcard_postfixes: Vec<String>,
}

impl ProxyAddressing {
    pub fn new(dns_name: impl Into<String>, port: u16) -> Self {
        Self {
            dns_name: dns_name.into(),
            port,
            wildcard_postfixes: Vec::new(),
        }
    }

    pub fn from_config(config: &AddressingConfig) -> Self {
        Self::new(config.dns_name.clone(), config.port)
            .with_wildcard_postfixes(config.wildcard_dns_postfixes.clone())
    }

    pub fn with_wildcard_postfixes(mut self, postfixes: Vec<String>) -> Self {
        self.wildcard_postfixes = postfixes
            .into_iter()
            .map(|postfix| postfix.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    fn authority(&self) -> String {
        if self.dns_name.contains(':') && !self.dns_name.starts_with('[') {
            format!("[{}]:{}", self.dns_name, self.port)
        } else {
            format!("{}:{}", self.dns_name, self.port)
        }
    }

    /// Proxy URI for a path (and optional query) on the proxy's authority.
    pub fn proxy_uri(&self, path_and_query: &str) -> Result<Url, AddressingError> {
        let raw = format!("http://{}{}", self.authority(), ensure_leading_slash(path_and_query));
        let url = Url::parse(&raw).map_err(|e| AddressingError::invalid(&raw, e))?;
        Ok(normalize(url))
    }

    /// Proxy URI of a graph addressed by name: `/?graph=<name>`.
    pub fn graph_uri(&self, graph: &str) -> Result<Url, AddressingError> {
        self.proxy_uri(&format!("/?graph={}", urlencoding::encode(graph)))
    }

    /// Proxy URI of an origin resource: `/?uri=<origin>`.
    pub fn resource_uri(&self, origin: &Url) -> Result<Url, AddressingError> {
        self.proxy_uri(&format!("/?uri={}", urlencoding::encode(origin.as_str())))
    }

    /// Resolve the target of an inbound request to its normalized proxy URI.
    ///
    /// The configured authority is used unless the request names a literal
    /// IPv6 host or a wildcard DNS host encoding one.
    pub fn resolve(&self, uri: &Uri, host_header: Option<&str>) -> Result<Url, AddressingError> {
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let mut url = self.proxy_uri(path_and_query)?;

        let requested_host = uri
            .authority()
            .map(|authority| authority.as_str().to_string())
            .or_else(|| host_header.map(str::to_string));
        if let Some(authority) = requested_host {
            if let Some((address, port)) = self.ipv6_authority(&authority) {
                url.set_host(Some(&format!("[{address}]")))
                    .map_err(|e| AddressingError::invalid(uri.to_string(), e))?;
                url.set_port(Some(port.unwrap_or(self.port)))
                    .map_err(|_| AddressingError::invalid(uri.to_string(), "cannot carry a port"))?;
            }
        }

        Ok(normalize(url))
    }

    /// IPv6 address named by an authority, either literally or through a
    /// wildcard DNS name.
    fn ipv6_authority(&self, authority: &str) -> Option<(Ipv6Addr, Option<u16>)> {
        let parsed = Url::parse(&format!("http://{authority}/")).ok()?;
        let port = parsed.port();
        match parsed.host()? {
            Host::Ipv6(address) => Some((address, port)),
            Host::Domain(domain) => self.wildcard_ipv6(domain).map(|address| (address, port)),
            Host::Ipv4(_) => None,
        }
    }

    fn wildcard_ipv6(&self, domain: &str) -> Option<Ipv6Addr> {
        let domain = domain.to_ascii_lowercase();
        self.wildcard_postfixes.iter().find_map(|postfix| {
            let prefix = domain.strip_suffix(postfix.as_str())?.strip_suffix('.')?;
            prefix.replace('-', ":").parse().ok()
        })
    }
}

fn ensure_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Canonical form of a proxy URI.
///
/// Drops the fragment and empty queries and re-encodes query pairs in one
/// canonical percent-encoding. Dot segments, host case and IPv6 literal
/// shortening are handled by the URL parser.
pub fn normalize(mut url: Url) -> Url {
    url.set_fragment(None);

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url
}
