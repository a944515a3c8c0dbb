use reqwest::blocking::Client;

use pixfeed_core::{FeedError, FeedResult};

/// Longest slice of an error body quoted back in a fetch error.
const BODY_EXCERPT_CHARS: usize = 200;

/// The remote renderer serving one WebP image per GET.
#[derive(Debug, Clone)]
pub struct Upstream {
    url: String,
}

impl Upstream {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Blocking GET of the image bytes. Must not be called from an async
    /// context; the HTTP handler runs it on a blocking worker.
    pub fn fetch(&self) -> FeedResult<Vec<u8>> {
        let client = Client::builder()
            .build()
            .map_err(|e| FeedError::fetch(&self.url, error_chain(&e)))?;

        let res = client
            .get(&self.url)
            .send()
            .map_err(|e| FeedError::fetch(&self.url, error_chain(&e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            let excerpt: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
            return Err(FeedError::fetch(
                &self.url,
                format!("HTTP {}: {}", status, excerpt.trim()),
            ));
        }

        let bytes = res.bytes().map_err(|e| {
            FeedError::fetch(&self.url, format!("failed to read body: {}", error_chain(&e)))
        })?;

        tracing::debug!("Fetched {} bytes from {}", bytes.len(), self.url);

        Ok(bytes.to_vec())
    }
}

/// `Display` of an error followed by each of its sources.
///
/// reqwest hides the useful part ("Connection refused") in the source chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl std::fmt::Display for Outer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "error sending request")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let err = Outer(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "Connection refused",
        ));
        assert_eq!(error_chain(&err), "error sending request: Connection refused");
    }

    #[test]
    fn test_invalid_url_is_fetch_error() {
        let err = Upstream::new("not a url").fetch().unwrap_err();
        assert!(matches!(err, FeedError::Fetch(_)));
        assert!(err.to_string().contains("not a url"));
    }
}
