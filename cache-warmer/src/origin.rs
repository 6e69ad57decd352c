use async_trait::async_trait;
use common_cache::Fetcher;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

// Unreserved characters and `:` stay readable; everything else is escaped so a
// key always maps to exactly one path segment.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b':');

#[derive(Error, Debug)]
pub enum OriginError {
    #[error("failed to build origin client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("origin returned {status} for {url}")]
    UnexpectedStatus { url: String, status: StatusCode },
}

/// Fetches values over HTTP: `GET {base_url}/{key}`, with the key percent-encoded.
///
/// A 200 body is the value and a 404 means the key does not exist. Any other
/// status is an error and is never cached.
pub struct HttpOriginFetcher {
    client: Client,
    base_url: String,
}

impl HttpOriginFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OriginError> {
        let client = Client::builder()
            .user_agent("PostHog Cache Warmer")
            .timeout(timeout)
            .build()
            .map_err(OriginError::Client)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, utf8_percent_encode(key, KEY_SEGMENT))
    }
}

#[async_trait]
impl Fetcher for HttpOriginFetcher {
    type Error = OriginError;

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, OriginError> {
        let url = self.url_for(key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| OriginError::Request {
                url: url.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|source| OriginError::Request {
                        url: url.clone(),
                        source,
                    })?;
                Ok(Some(body.to_vec()))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(OriginError::UnexpectedStatus { url, status }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;

    fn fetcher(server: &MockServer) -> HttpOriginFetcher {
        HttpOriginFetcher::new(&server.url("/origin/"), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_url_for_trims_trailing_slash() {
        let fetcher =
            HttpOriginFetcher::new("http://origin.local/v1/", Duration::from_secs(1)).unwrap();
        assert_eq!(fetcher.url_for("user:42"), "http://origin.local/v1/user:42");
    }

    #[test]
    fn test_url_for_encodes_key() {
        let fetcher =
            HttpOriginFetcher::new("http://origin.local/v1", Duration::from_secs(1)).unwrap();
        assert_eq!(
            fetcher.url_for("search:a#b"),
            "http://origin.local/v1/search:a%23b"
        );
        assert_eq!(
            fetcher.url_for("a/b?c=d e%"),
            "http://origin.local/v1/a%2Fb%3Fc%3Dd%20e%25"
        );
    }

    #[tokio::test]
    async fn test_reserved_characters_reach_origin_intact() {
        let server = MockServer::start();
        let truncated = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/origin/search:a");
            then.status(200).body("search:a");
        });
        let full = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path_contains("b");
            then.status(200).body("search:a#b");
        });

        let value = fetcher(&server).fetch("search:a#b").await.unwrap();
        assert_eq!(value, Some(b"search:a#b".to_vec()));
        assert_eq!(full.hits(), 1);
        assert_eq!(truncated.hits(), 0);
    }

    #[tokio::test]
    async fn test_ok_is_value() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/origin/user:42");
            then.status(200).body("Alice");
        });

        let value = fetcher(&server).fetch("user:42").await.unwrap();
        assert_eq!(value, Some(b"Alice".to_vec()));
        assert_eq!(mock.hits(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_absent() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/origin/user:404");
            then.status(404);
        });

        let value = fetcher(&server).fetch("user:404").await.unwrap();
        assert_eq!(value, None);
        assert_eq!(mock.hits(), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_error() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/origin/user:1");
            then.status(503);
        });

        match fetcher(&server).fetch("user:1").await {
            Err(OriginError::UnexpectedStatus { status, url }) => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert!(url.ends_with("/origin/user:1"));
            }
            other => panic!("expected unexpected status, got {other:?}"),
        }
        assert_eq!(mock.hits(), 1);
    }
}
