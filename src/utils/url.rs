//! Endpoint URL handling for the generation server.

/// Which transport a connection uses, decided from the endpoint prefix alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportScheme {
    Plain,
    Secure,
}

impl TransportScheme {
    /// `https://` (any case) selects TLS; everything else is plain HTTP.
    ///
    /// ```
    /// use quillpad::utils::url::TransportScheme;
    ///
    /// assert_eq!(TransportScheme::detect("https://gpu-box:11434"), TransportScheme::Secure);
    /// assert_eq!(TransportScheme::detect("http://localhost:11434"), TransportScheme::Plain);
    /// ```
    pub fn detect(endpoint_url: &str) -> Self {
        let trimmed = endpoint_url.trim_start();
        match trimmed.get(..8) {
            Some(prefix) if prefix.eq_ignore_ascii_case("https://") => TransportScheme::Secure,
            _ => TransportScheme::Plain,
        }
    }
}

/// Strip whitespace and trailing slashes so endpoints can be appended.
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash.
///
/// ```
/// use quillpad::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:11434/", "/api/generate"),
///     "http://localhost:11434/api/generate"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalize_base_url(base_url), endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_scheme_from_prefix() {
        assert_eq!(
            TransportScheme::detect("https://example.com"),
            TransportScheme::Secure
        );
        assert_eq!(
            TransportScheme::detect("  HTTPS://example.com"),
            TransportScheme::Secure
        );
        assert_eq!(
            TransportScheme::detect("http://127.0.0.1:11434"),
            TransportScheme::Plain
        );
        // No scheme at all falls back to plain; the request then fails to
        // build and surfaces as a connection error.
        assert_eq!(
            TransportScheme::detect("localhost:11434"),
            TransportScheme::Plain
        );
        assert_eq!(TransportScheme::detect("https:"), TransportScheme::Plain);
        assert_eq!(TransportScheme::detect(""), TransportScheme::Plain);
    }

    #[test]
    fn generate_url_is_joined_with_one_slash() {
        assert_eq!(
            construct_api_url("http://localhost:11434", "api/generate"),
            "http://localhost:11434/api/generate"
        );
        assert_eq!(
            construct_api_url("http://localhost:11434///", "api/generate"),
            "http://localhost:11434/api/generate"
        );
        assert_eq!(
            construct_api_url(" https://host/ollama/ ", "/api/generate"),
            "https://host/ollama/api/generate"
        );
    }

    #[test]
    fn normalize_handles_degenerate_input() {
        assert_eq!(normalize_base_url(""), "");
        assert_eq!(normalize_base_url("///"), "");
    }
}
