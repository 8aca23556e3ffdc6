use std::io::{Read, Write};
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Archive bodies are consumed in chunks of this size
pub const DOWNLOAD_CHUNK_SIZE: usize = 8192;

const MAX_REDIRECTS: usize = 5;
const USER_AGENT: &str = concat!("s2harvest/", env!("CARGO_PKG_VERSION"));

/// Errors raised by a `Transport`
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote access used by the catalog, token, and download clients
pub trait Transport {
    /// GET `url` and parse the body as JSON
    fn get_json(&self, url: &str) -> Result<Value, TransportError>;

    /// POST a form-encoded body and parse the response as JSON
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, TransportError>;

    /// GET `url` with a bearer token and stream the body into `sink`; returns bytes written
    fn download(&self, url: &str, bearer: &str, sink: &mut dyn Write)
    -> Result<u64, TransportError>;
}

/// `Transport` over a blocking reqwest connection pool
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    download_client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(120))
            .build()?;
        // redirects are followed by hand so the bearer header survives host changes
        let download_client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .redirect(Policy::none())
            .build()?;
        Ok(Self {
            client,
            download_client,
        })
    }

    fn check_status(response: Response, url: &str) -> Result<Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            })
        }
    }

    fn decode_json(response: Response, url: &str) -> Result<Value, TransportError> {
        response.json::<Value>().map_err(|e| TransportError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Transport for HttpTransport {
    fn get_json(&self, url: &str) -> Result<Value, TransportError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send()?;
        let response = Self::check_status(response, url)?;
        Self::decode_json(response, url)
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, TransportError> {
        debug!("POST {}", url);
        let response = self.client.post(url).form(form).send()?;
        let response = Self::check_status(response, url)?;
        Self::decode_json(response, url)
    }

    fn download(
        &self,
        url: &str,
        bearer: &str,
        sink: &mut dyn Write,
    ) -> Result<u64, TransportError> {
        let mut current = url.to_string();
        let mut response = self.download_client.get(&current).bearer_auth(bearer).send()?;
        for _ in 0..MAX_REDIRECTS {
            if !response.status().is_redirection() {
                break;
            }
            let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
            else {
                break;
            };
            current = response
                .url()
                .join(location)
                .map_err(|e| TransportError::Decode {
                    url: current.clone(),
                    reason: format!("bad redirect location: {e}"),
                })?
                .to_string();
            debug!("Following redirect to {}", current);
            response = self.download_client.get(&current).bearer_auth(bearer).send()?;
        }
        let mut response = Self::check_status(response, &current)?;

        let mut chunk = vec![0u8; DOWNLOAD_CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let n = response.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            sink.write_all(&chunk[..n])?;
            written += n as u64;
        }
        sink.flush()?;
        Ok(written)
    }
}
