//! Connection candidate resolution
//!
//! A connection attempt walks an ordered list of candidates: explicitly
//! configured proxies first, then proxies from the environment, and always a
//! direct connection last. Each candidate is tried in turn until one yields
//! an established connection.

use crate::config::{ClientConfig, ProxyConfig};
use crate::error::DeploymentError;

/// Default port for a proxy URI that does not specify one
const DEFAULT_PROXY_PORT: u16 = 80;

/// One way of reaching the target
#[derive(Debug, Clone)]
pub enum Candidate {
    /// Tunnel through a forward proxy via HTTP CONNECT
    Proxy(ProxyConfig),
    /// Connect straight to the target
    Direct,
}

impl std::fmt::Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Candidate::Proxy(proxy) => write!(f, "proxy {}:{}", proxy.host, proxy.port),
            Candidate::Direct => f.write_str("direct"),
        }
    }
}

/// Resolve the candidate list for a connection attempt.
///
/// Explicit proxies from the configuration come first, in order. When none
/// are configured, `ALL_PROXY` is consulted, then `HTTPS_PROXY` or
/// `HTTP_PROXY` depending on whether the target is secure. The list always
/// ends with [`Candidate::Direct`].
pub fn resolve_candidates(config: &ClientConfig, secure: bool) -> Vec<Candidate> {
    resolve_with(config, secure, |name| std::env::var(name).ok())
}

fn resolve_with(
    config: &ClientConfig,
    secure: bool,
    env: impl Fn(&str) -> Option<String>,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    if config.proxies.is_empty() {
        let scheme_var = if secure { "HTTPS_PROXY" } else { "HTTP_PROXY" };
        // Both spellings are conventional.
        let lookup = |name: &str| env(name).or_else(|| env(&name.to_lowercase()));
        let from_env = lookup("ALL_PROXY").or_else(|| lookup(scheme_var));
        if let Some(uri) = from_env {
            match parse_proxy_uri(&uri) {
                Ok(proxy) => candidates.push(Candidate::Proxy(proxy)),
                Err(err) => {
                    tracing::warn!(uri = %uri, error = %err, "ignoring unusable proxy from environment");
                }
            }
        }
    } else {
        candidates.extend(config.proxies.iter().cloned().map(Candidate::Proxy));
    }

    candidates.push(Candidate::Direct);
    candidates
}

/// Parse a proxy URI such as `http://proxy.example.com:3128`.
///
/// The scheme is optional and ignored; the port defaults to 80.
pub fn parse_proxy_uri(uri: &str) -> Result<ProxyConfig, DeploymentError> {
    let trimmed = uri.trim();
    let without_scheme = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed,
    };
    let authority = without_scheme.split('/').next().unwrap_or_default();

    if authority.is_empty() {
        return Err(DeploymentError::InvalidUri(uri.to_string()));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| DeploymentError::InvalidUri(uri.to_string()))?;
            if host.is_empty() {
                return Err(DeploymentError::InvalidUri(uri.to_string()));
            }
            Ok(ProxyConfig::new(host, port))
        }
        None => Ok(ProxyConfig::new(authority, DEFAULT_PROXY_PORT)),
    }
}
