//! Thin wrapper over `reqwest` used by both the metadata factory and the
//! concurrent installer: GET-with-retry, streaming download with a running
//! hash, `.sha256` mirror fetch, and metalink-based mirror selection.

mod metalink;

use std::{path::Path, time::Duration};

use rand::Rng;
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

pub use metalink::parse_metalink;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("connection failed for {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download failed for {url}: HTTP {status}")]
    Download { url: String, status: StatusCode },
    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    Checksum {
        url: String,
        expected: String,
        actual: String,
    },
    #[error("failed to obtain a valid checksum for {path} after {attempts} attempts")]
    ChecksumDownloadFailure { path: String, attempts: u32 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    connection_timeout: Duration,
    response_timeout: Duration,
    max_retries_on_connection: u32,
    max_retries_for_hash: u32,
    trusted_mirrors: Vec<Url>,
    blacklist: Vec<String>,
}

impl HttpClient {
    pub fn new(
        connection_timeout: Duration,
        response_timeout: Duration,
        max_retries_on_connection: u32,
        max_retries_for_hash: u32,
        trusted_mirrors: Vec<Url>,
        blacklist: Vec<String>,
    ) -> reqwest::Result<Self> {
        let client = Client::builder().connect_timeout(connection_timeout).build()?;
        Ok(Self {
            client,
            connection_timeout,
            response_timeout,
            max_retries_on_connection,
            max_retries_for_hash,
            trusted_mirrors,
            blacklist,
        })
    }

    /// Fetches `url` as text, retrying connection-class failures.
    pub async fn get_text(&self, url: &Url) -> Result<String, HttpError> {
        let mut last_err = None;
        for attempt in 0..=self.max_retries_on_connection {
            match self.get_text_once(url).await {
                Ok(text) => return Ok(text),
                Err(err @ HttpError::Connection { .. }) => {
                    warn!(%url, attempt, "connection error, retrying");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.expect("loop ran at least once"))
    }

    async fn get_text_once(&self, url: &Url) -> Result<String, HttpError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.response_timeout)
            .send()
            .await
            .map_err(|source| HttpError::Connection {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(HttpError::Download {
                url: url.to_string(),
                status: response.status(),
            });
        }

        response.text().await.map_err(|source| HttpError::Connection {
            url: url.to_string(),
            source,
        })
    }

    /// Streams `url` into `dst`, verifying the running SHA-256 digest against
    /// `expected_hex` once the body is fully written. On mismatch the partial
    /// file is removed.
    pub async fn download_binary(
        &self,
        url: &Url,
        dst: &Path,
        expected_hex: &str,
    ) -> Result<(), HttpError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.response_timeout)
            .send()
            .await
            .map_err(|source| HttpError::Connection {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(HttpError::Download {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let mut hasher = Sha256::new();
        let mut file = tokio::fs::File::create(dst).await?;
        let mut response = response;

        while let Some(chunk) = response.chunk().await.map_err(|source| HttpError::Connection {
            url: url.to_string(),
            source,
        })? {
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let actual = encode_hex(&hasher.finalize());
        if !actual.eq_ignore_ascii_case(expected_hex) {
            let _ = tokio::fs::remove_file(dst).await;
            return Err(HttpError::Checksum {
                url: url.to_string(),
                expected: expected_hex.to_owned(),
                actual,
            });
        }

        Ok(())
    }

    /// Fetches `<mirror>/<archive_path>.sha256` from a randomly selected
    /// trusted mirror, retrying on failure up to `max_retries_for_hash`
    /// times. Returns the lowercase hex digest.
    pub async fn get_hash_for(&self, archive_path: &str) -> Result<String, HttpError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mirror = self.pick_mirror();
            let url = mirror
                .join(&format!("{archive_path}.sha256"))
                .unwrap_or_else(|_| mirror.clone());

            match self.get_text_once(&url).await {
                Ok(body) => {
                    if let Some(hex_digest) = body.split_whitespace().next() {
                        if hex_digest.len() == 64
                            && hex_digest.bytes().all(|b| b.is_ascii_hexdigit())
                        {
                            return Ok(hex_digest.to_lowercase());
                        }
                    }
                    debug!(%url, "malformed checksum body");
                }
                Err(err) => debug!(%url, %err, "checksum fetch failed"),
            }

            if attempts >= self.max_retries_for_hash {
                return Err(HttpError::ChecksumDownloadFailure {
                    path: archive_path.to_owned(),
                    attempts,
                });
            }
        }
    }

    fn pick_mirror(&self) -> Url {
        if self.trusted_mirrors.is_empty() {
            // Caller is expected to have supplied at least the primary base
            // URL as a mirror; fall back to a conservative default only if
            // misconfigured.
            return Url::parse("https://download.qt.io/").expect("valid url");
        }
        let idx = rand::rng().random_range(0..self.trusted_mirrors.len());
        self.trusted_mirrors[idx].clone()
    }

    /// Resolves an alternate mirror for `primary` via its IETF metalink v4
    /// sidecar (`<primary>.meta4`). Falls back to `primary` if the metalink
    /// is unavailable or every listed mirror is blacklisted.
    pub async fn alt_link(&self, primary: &Url) -> Url {
        let meta4_url = match primary.join(&format!("{}.meta4", primary.path())) {
            Ok(u) => u,
            Err(_) => return primary.clone(),
        };

        let body = match self.get_text_once(&meta4_url).await {
            Ok(body) => body,
            Err(_) => return primary.clone(),
        };

        match parse_metalink(&body) {
            Ok(urls) => urls
                .into_iter()
                .find(|u| !self.blacklist.iter().any(|b| u.as_str().contains(b.as_str())))
                .unwrap_or_else(|| primary.clone()),
            Err(_) => primary.clone(),
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{byte:02x}").expect("writing to a String never fails");
    }
    out
}
