use crate::config;
use async_trait::async_trait;
use url::Url;

/// Classification of a single delivery attempt. Transport-level failures
/// never escape as errors; they fold into [`Outcome::Unreachable`] so the
/// forwarder handles every failure mode the same way.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Downstream accepted the payload (2xx)
    Delivered(u16),
    /// Downstream answered with a non-success status
    Rejected(u16),
    /// The request never completed: connection error, DNS failure, timeout
    Unreachable(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Delivered(_))
    }
}

/// One outbound delivery attempt per call.
#[async_trait]
pub trait Deliver: Send + Sync {
    async fn deliver(&self, origin: &str, payload: &[u8]) -> Outcome;
}

/// HTTP client for the downstream collector. Each attempt issues a single
/// POST or PUT to the configured base URL with the originating address
/// attached as an `ip` query parameter and the payload bytes unmodified
/// as the request body.
pub struct HttpDownstream {
    client: reqwest::Client,
    url: Url,
    method: config::Method,
}

impl HttpDownstream {
    pub fn new(config: &config::Upstream) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(HttpDownstream {
            client,
            url: config.url.clone(),
            method: config.method,
        })
    }

    fn request_url(&self, origin: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("ip", origin);
        url
    }
}

#[async_trait]
impl Deliver for HttpDownstream {
    async fn deliver(&self, origin: &str, payload: &[u8]) -> Outcome {
        let url = self.request_url(origin);
        let request = match self.method {
            config::Method::Post => self.client.post(url),
            config::Method::Put => self.client.put(url),
        };

        match request.body(payload.to_vec()).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if response.status().is_success() {
                    Outcome::Delivered(status)
                } else {
                    Outcome::Rejected(status)
                }
            }
            Err(e) => Outcome::Unreachable(e.to_string()),
        }
    }
}
