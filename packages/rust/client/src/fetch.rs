//! Transcript retrieval from object storage / CDN URLs.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use noteforge_shared::{NoteforgeError, Result};

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("noteforge/", env!("CARGO_PKG_VERSION"));

/// Retrieves the raw text of a transcript.
pub trait TextFetcher: Send + Sync {
    fn fetch_text(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Plain HTTP(S) GET fetcher.
#[derive(Clone)]
pub struct HttpTextFetcher {
    client: Client,
}

impl HttpTextFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| NoteforgeError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl TextFetcher for HttpTextFetcher {
    #[instrument(skip(self))]
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url)
            .map_err(|e| NoteforgeError::input(format!("invalid transcript URL '{url}': {e}")))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(NoteforgeError::input(format!(
                "unsupported transcript URL scheme: {}",
                parsed.scheme()
            )));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| NoteforgeError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NoteforgeError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| NoteforgeError::Network(format!("{url}: body read failed: {e}")))?;

        debug!(bytes = body.len(), "transcript fetched");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_body_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subs/talk.srt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("1\n00:00:00,000 --> 00:00:01,000\nhi\n"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpTextFetcher::new(Duration::from_secs(5)).unwrap();
        let body = fetcher
            .fetch_text(&format!("{}/subs/talk.srt", server.uri()))
            .await
            .unwrap();
        assert!(body.contains("hi"));
    }

    #[tokio::test]
    async fn missing_object_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpTextFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher
            .fetch_text(&format!("{}/gone.srt", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, NoteforgeError::Network(_)));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let fetcher = HttpTextFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch_text("file:///etc/passwd").await.unwrap_err();
        assert!(err.is_skip());
        let err = fetcher.fetch_text("not a url").await.unwrap_err();
        assert!(err.is_skip());
    }
}
