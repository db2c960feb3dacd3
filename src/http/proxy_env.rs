//! Outbound proxy resolution from the process environment.
//!
//! # Responsibilities
//! - Read `HTTP_PROXY`, `HTTPS_PROXY`, `NO_PROXY` (upper-case first, then lower-case)
//! - Pick, per target URL, the proxy (if any) and the `NO_PROXY` list that goes with it
//!
//! # Design Decisions
//! - Resolution is a plain read with no caching; callers re-read per outbound call
//! - `localhost` and loopback addresses are never proxied
//! - A proxy value without a scheme is taken as `http://`
//! - `NO_PROXY` matching is left to `reqwest::NoProxy` on the outbound client

use url::{Host, Url};

pub const HTTP_PROXY: [&str; 2] = ["HTTP_PROXY", "http_proxy"];
pub const HTTPS_PROXY: [&str; 2] = ["HTTPS_PROXY", "https_proxy"];
pub const NO_PROXY: [&str; 2] = ["NO_PROXY", "no_proxy"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid proxy url '{value}': {reason}")]
pub struct InvalidProxyUrl {
    pub value: String,
    pub reason: String,
}

/// A snapshot of the proxy variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySettings {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

/// The proxy chosen for one target, with the exemptions it must honour.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutboundProxy {
    pub url: Url,
    pub no_proxy: Option<String>,
}

impl OutboundProxy {
    /// The `reqwest` proxy for this selection.
    pub fn to_reqwest(&self) -> reqwest::Result<reqwest::Proxy> {
        let no_proxy = self.no_proxy.as_deref().and_then(reqwest::NoProxy::from_string);
        Ok(reqwest::Proxy::all(self.url.as_str())?.no_proxy(no_proxy))
    }
}

impl ProxySettings {
    /// Read the current process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: [&str; 2]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .find(|value| !value.trim().is_empty())
        };
        Self {
            http_proxy: first(HTTP_PROXY),
            https_proxy: first(HTTPS_PROXY),
            no_proxy: first(NO_PROXY),
        }
    }

    /// The proxy to use for `target`, or `None` to connect directly.
    pub fn proxy_for(&self, target: &Url) -> Result<Option<OutboundProxy>, InvalidProxyUrl> {
        let proxy = match target.scheme() {
            "https" => self.https_proxy.as_deref(),
            "http" => self.http_proxy.as_deref(),
            _ => None,
        };
        let Some(proxy) = proxy else {
            return Ok(None);
        };
        match target.host() {
            None => return Ok(None),
            Some(host) if is_loopback(&host) => return Ok(None),
            Some(_) => {}
        }

        Ok(Some(OutboundProxy {
            url: parse_proxy_url(proxy)?,
            no_proxy: self.no_proxy.as_ref().map(|v| v.trim().to_string()),
        }))
    }
}

fn is_loopback(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => domain.trim_end_matches('.').eq_ignore_ascii_case("localhost"),
        Host::Ipv4(ip) => ip.is_loopback(),
        Host::Ipv6(ip) => ip.is_loopback(),
    }
}

fn parse_proxy_url(value: &str) -> Result<Url, InvalidProxyUrl> {
    let value = value.trim();
    let candidate = if value.contains("://") {
        value.to_string()
    } else {
        format!("http://{}", value)
    };
    let url = Url::parse(&candidate).map_err(|e| InvalidProxyUrl {
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(InvalidProxyUrl {
            value: value.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> ProxySettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ProxySettings::from_lookup(|name| vars.get(name).cloned())
    }

    fn proxy_for(settings: &ProxySettings, target: &str) -> Option<String> {
        settings
            .proxy_for(&Url::parse(target).unwrap())
            .unwrap()
            .map(|p| p.url.to_string())
    }

    #[test]
    fn test_upper_case_wins() {
        let s = settings(&[
            ("HTTP_PROXY", "http://upper:3128"),
            ("http_proxy", "http://lower:3128"),
        ]);
        assert_eq!(s.http_proxy.as_deref(), Some("http://upper:3128"));

        let s = settings(&[("HTTP_PROXY", ""), ("http_proxy", "http://lower:3128")]);
        assert_eq!(s.http_proxy.as_deref(), Some("http://lower:3128"));
    }

    #[test]
    fn test_scheme_selects_variable() {
        let s = settings(&[("http_proxy", "http://plain:3128"), ("https_proxy", "http://tls:3128")]);
        assert_eq!(
            proxy_for(&s, "http://www.backend.com/x").as_deref(),
            Some("http://plain:3128/")
        );
        assert_eq!(
            proxy_for(&s, "https://www.backend.com/x").as_deref(),
            Some("http://tls:3128/")
        );
    }

    #[test]
    fn test_missing_scheme_defaults_to_http() {
        let s = settings(&[("http_proxy", "proxy.internal:8080")]);
        assert_eq!(
            proxy_for(&s, "http://www.backend.com/").as_deref(),
            Some("http://proxy.internal:8080/")
        );
    }

    #[test]
    fn test_loopback_never_proxied() {
        let s = settings(&[("http_proxy", "http://proxy:3128")]);
        assert_eq!(proxy_for(&s, "http://localhost:8080/"), None);
        assert_eq!(proxy_for(&s, "http://127.0.0.1:8080/"), None);
        assert_eq!(proxy_for(&s, "http://[::1]:8080/"), None);
    }

    #[test]
    fn test_no_proxy_travels_with_proxy() {
        let s = settings(&[
            ("http_proxy", "http://proxy:3128"),
            ("NO_PROXY", " .internal,10.0.0.0/8 "),
        ]);
        let selected = s
            .proxy_for(&Url::parse("http://svc.internal/").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(selected.url.as_str(), "http://proxy:3128/");
        assert_eq!(selected.no_proxy.as_deref(), Some(".internal,10.0.0.0/8"));
        assert!(selected.to_reqwest().is_ok());
    }

    #[test]
    fn test_no_proxy_configured() {
        let s = settings(&[]);
        assert_eq!(s, ProxySettings::default());
        assert_eq!(proxy_for(&s, "http://www.backend.com/"), None);
    }

    #[test]
    fn test_invalid_proxy_url() {
        let target = Url::parse("http://www.backend.com/").unwrap();
        for value in ["ftp://proxy:21", "socks5://proxy:1080", "socks5h://proxy:1080"] {
            let s = settings(&[("http_proxy", value)]);
            let err = s.proxy_for(&target).unwrap_err();
            assert_eq!(err.value, value);
        }
    }
}
