use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// Plain HTTP to a non-local host would leak the API key.
    #[error("Insecure URL: HTTPS required for {0}")]
    Insecure(String),
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validates the backend endpoint the client will send credentials to.
///
/// HTTPS is required, except for loopback hosts so a local backend (or a mock
/// server in tests) can be used over plain HTTP.
///
/// ```
/// use bazaar::util::validate_endpoint;
///
/// assert!(validate_endpoint("https://abc.supabase.co").is_ok());
/// assert!(validate_endpoint("http://127.0.0.1:54321").is_ok());
/// assert!(validate_endpoint("http://abc.supabase.co").is_err());
/// ```
pub fn validate_endpoint(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback_host(&url) => {
            tracing::warn!(endpoint = %url, "Using non-HTTPS backend endpoint (localhost only)");
            Ok(url)
        }
        "http" => Err(UrlValidationError::Insecure(
            url.host_str().unwrap_or_default().to_owned(),
        )),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

/// Validates a remote URL (e.g. a listing image) before handing it to the
/// system opener.
///
/// Rejects non-HTTP(S) schemes, localhost and private address ranges, since the
/// URL comes from user-submitted listing data.
pub fn validate_url_for_open(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if let Some(host) = url.host_str() {
        if host.eq_ignore_ascii_case("localhost") {
            return Err(UrlValidationError::Localhost);
        }

        if let Some(ip) = parse_host_ip(host) {
            if ip.is_loopback() {
                return Err(UrlValidationError::Localhost);
            }
            if is_private_ip(&ip) {
                return Err(UrlValidationError::PrivateIp(ip.to_string()));
            }
        }
    }

    Ok(url)
}

fn is_loopback_host(url: &Url) -> bool {
    match url.host_str() {
        Some(host) if host.eq_ignore_ascii_case("localhost") => true,
        Some(host) => parse_host_ip(host).is_some_and(|ip| ip.is_loopback()),
        None => false,
    }
}

/// Strip brackets from IPv6 hosts before parsing.
fn parse_host_ip(host: &str) -> Option<IpAddr> {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
        .parse::<IpAddr>()
        .ok()
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_https_accepted() {
        let url = validate_endpoint("https://project.supabase.co").unwrap();
        assert_eq!(url.host_str(), Some("project.supabase.co"));
    }

    #[test]
    fn test_endpoint_plain_http_rejected() {
        let err = validate_endpoint("http://project.supabase.co").unwrap_err();
        assert!(matches!(err, UrlValidationError::Insecure(_)));
    }

    #[test]
    fn test_endpoint_loopback_http_accepted() {
        assert!(validate_endpoint("http://localhost:54321").is_ok());
        assert!(validate_endpoint("http://127.0.0.1:8080").is_ok());
        assert!(validate_endpoint("http://[::1]:8080").is_ok());
    }

    #[test]
    fn test_endpoint_other_schemes_rejected() {
        assert!(matches!(
            validate_endpoint("ftp://project.supabase.co"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(validate_endpoint("not a url").is_err());
    }

    #[test]
    fn test_open_public_image_accepted() {
        assert!(validate_url_for_open("https://cdn.example.com/listing-images/u1/1.jpg").is_ok());
    }

    #[test]
    fn test_open_rejects_local_and_private() {
        assert!(validate_url_for_open("http://localhost/img.png").is_err());
        assert!(validate_url_for_open("http://127.0.0.1/img.png").is_err());
        assert!(validate_url_for_open("http://192.168.1.1/img.png").is_err());
        assert!(validate_url_for_open("http://10.0.0.1:3000/img.png").is_err());
        assert!(validate_url_for_open("http://169.254.1.1/img.png").is_err());
        assert!(validate_url_for_open("http://[fe80::1]/img.png").is_err());
        assert!(validate_url_for_open("http://0.0.0.0/img.png").is_err());
    }

    #[test]
    fn test_open_rejects_non_http_schemes() {
        assert!(validate_url_for_open("file:///etc/passwd").is_err());
        assert!(validate_url_for_open("javascript:alert(1)").is_err());
    }
}
