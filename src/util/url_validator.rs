use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Reasons a subscription URL is refused.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    #[error("Localhost not allowed")]
    Localhost,
}

/// Which feed URLs may be subscribed to.
///
/// The default policy rejects loopback and private-network hosts so that an
/// imported subscription list cannot make the poller probe internal services
/// (SSRF). Self-hosted setups can opt out with `allow_private_hosts`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlPolicy {
    pub allow_private_hosts: bool,
}

impl UrlPolicy {
    /// Parses `url_str` and checks it against the policy.
    ///
    /// Only `http` and `https` are accepted. Unless private hosts are
    /// allowed, `localhost`, loopback, RFC 1918, link-local, unique-local and
    /// unspecified addresses are refused. Hostnames are not resolved.
    ///
    /// # Examples
    ///
    /// ```
    /// use feedmill::util::UrlPolicy;
    ///
    /// let policy = UrlPolicy::default();
    /// assert!(policy.validate("https://example.com/feed.xml").is_ok());
    /// assert!(policy.validate("http://192.168.1.1/feed").is_err());
    /// assert!(policy.validate("file:///etc/passwd").is_err());
    ///
    /// let permissive = UrlPolicy { allow_private_hosts: true };
    /// assert!(permissive.validate("http://localhost:8080/feed").is_ok());
    /// ```
    pub fn validate(&self, url_str: &str) -> Result<Url, UrlValidationError> {
        let url = Url::parse(url_str)?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
        }

        let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;
        if self.allow_private_hosts {
            return Ok(url);
        }

        if host.eq_ignore_ascii_case("localhost") {
            return Err(UrlValidationError::Localhost);
        }

        // IPv6 hosts come bracketed
        let bare = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if let Ok(ip) = bare.parse::<IpAddr>() {
            if ip.is_loopback() {
                return Err(UrlValidationError::Localhost);
            }
            if is_private_ip(&ip) {
                return Err(UrlValidationError::PrivateIp(ip.to_string()));
            }
        }

        Ok(url)
    }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => ipv4.is_private() || ipv4.is_link_local() || ipv4.is_unspecified(),
        IpAddr::V6(ipv6) => {
            if ipv6.is_unspecified() {
                return true;
            }
            let first = ipv6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link local
            (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict(url: &str) -> Result<Url, UrlValidationError> {
        UrlPolicy::default().validate(url)
    }

    #[test]
    fn test_public_urls_accepted() {
        assert!(strict("https://example.com/feed.xml").is_ok());
        assert!(strict("http://news.example.org").is_ok());
        assert!(strict("https://example.com:443/feed.xml").is_ok());
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(matches!(
            strict("file:///etc/passwd"),
            Err(UrlValidationError::UnsupportedScheme(s)) if s == "file"
        ));
        assert!(strict("ftp://example.com").is_err());
    }

    #[test]
    fn test_unparseable_url() {
        assert!(matches!(
            strict("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_localhost_rejected() {
        assert!(matches!(
            strict("http://localhost/feed"),
            Err(UrlValidationError::Localhost)
        ));
        assert!(strict("http://127.0.0.1/feed").is_err());
        assert!(strict("http://[::1]/feed").is_err());
    }

    #[test]
    fn test_private_ips_rejected() {
        for url in [
            "http://192.168.1.1/feed",
            "http://10.0.0.1:3000/feed",
            "http://172.16.0.1/feed",
            "http://169.254.1.1/feed",
            "http://0.0.0.0/feed",
            "http://[fe80::1]/feed",
            "http://[fd00::1]/feed",
        ] {
            assert!(
                matches!(strict(url), Err(UrlValidationError::PrivateIp(_))),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn test_allow_private_hosts() {
        let policy = UrlPolicy {
            allow_private_hosts: true,
        };
        assert!(policy.validate("http://127.0.0.1:8080/feed").is_ok());
        assert!(policy.validate("http://10.0.0.1/feed").is_ok());
        // scheme is still enforced
        assert!(policy.validate("file:///etc/passwd").is_err());
    }
}
