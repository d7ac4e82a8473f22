use crate::store::QueueStore;
use async_trait::async_trait;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::{Method, Request, Response, StatusCode, header};
use shared::http::{Handler, no_content, status_only};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Ingestion endpoint: turns inbound request bodies into queue entries
/// and responds as soon as the entry is durably written, never waiting
/// on downstream delivery. GET and HEAD act as liveness probes.
pub struct IngestService {
    store: Arc<QueueStore>,
    read_timeout: Duration,
}

impl IngestService {
    pub fn new(store: Arc<QueueStore>, read_timeout: Duration) -> Self {
        IngestService {
            store,
            read_timeout,
        }
    }

    async fn accept_payload(
        &self,
        req: Request<Incoming>,
        peer: SocketAddr,
    ) -> Response<BoxBody<Bytes, Infallible>> {
        // Reject up front rather than waiting on a body that may never
        // arrive.
        let Some(declared) = content_length(&req) else {
            tracing::warn!(peer = %peer.ip(), "rejecting payload without a valid Content-Length");
            return status_only(StatusCode::BAD_REQUEST);
        };

        // Bounded read: a sender that declares a length and then goes
        // quiet must not park this task forever.
        let body = match timeout(self.read_timeout, req.into_body().collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) => {
                tracing::warn!(peer = %peer.ip(), error = %e, "failed to read request body");
                return status_only(StatusCode::BAD_REQUEST);
            }
            Err(_) => {
                tracing::warn!(peer = %peer.ip(), "timed out reading request body");
                return status_only(StatusCode::BAD_REQUEST);
            }
        };
        if body.len() as u64 != declared {
            tracing::warn!(
                peer = %peer.ip(),
                declared,
                received = body.len(),
                "request body shorter than declared"
            );
            return status_only(StatusCode::BAD_REQUEST);
        }

        let origin = peer.ip().to_string();
        match self.store.enqueue(&origin, &body) {
            Ok(entry) => {
                tracing::info!(entry = entry.name(), bytes = body.len(), %origin, "payload queued");
                no_content()
            }
            Err(e) => {
                tracing::error!(%origin, error = %e, "failed to queue payload");
                status_only(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

#[async_trait]
impl Handler for IngestService {
    async fn handle(
        &self,
        req: Request<Incoming>,
        peer: SocketAddr,
    ) -> Response<BoxBody<Bytes, Infallible>> {
        match *req.method() {
            // Liveness probes; no payload semantics
            Method::GET | Method::HEAD => no_content(),
            // PUT is an alias of POST, not a distinct semantic
            Method::POST | Method::PUT => self.accept_payload(req, peer).await,
            _ => status_only(StatusCode::METHOD_NOT_ALLOWED),
        }
    }
}

fn content_length(req: &Request<Incoming>) -> Option<u64> {
    req.headers()
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompletionPolicy;
    use std::path::Path;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::watch;

    async fn start_ingest(base_dir: &Path) -> (SocketAddr, watch::Sender<bool>) {
        start_ingest_with_timeout(base_dir, Duration::from_secs(5)).await
    }

    async fn start_ingest_with_timeout(
        base_dir: &Path,
        read_timeout: Duration,
    ) -> (SocketAddr, watch::Sender<bool>) {
        let store = Arc::new(QueueStore::open(base_dir, CompletionPolicy::Archive).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(shared::http::serve_on(
            listener,
            shutdown_rx,
            Arc::new(IngestService::new(store, read_timeout)),
        ));

        (addr, shutdown_tx)
    }

    fn queued_files(base_dir: &Path) -> Vec<std::path::PathBuf> {
        let mut files: Vec<_> = std::fs::read_dir(base_dir.join("queue"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }

    #[tokio::test]
    async fn post_body_lands_in_queue() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, _shutdown) = start_ingest(dir.path()).await;

        let response = reqwest::Client::new()
            .post(format!("http://{addr}/any/path"))
            .body(&b"sensor reading"[..])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

        let files = queued_files(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(std::fs::read(&files[0]).unwrap(), b"sensor reading");
        // The origin IP is embedded in the entry name.
        let name = files[0].file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("_127.0.0.1"), "unexpected name: {name}");
    }

    #[tokio::test]
    async fn put_is_an_alias_of_post() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, _shutdown) = start_ingest(dir.path()).await;

        let response = reqwest::Client::new()
            .put(format!("http://{addr}/"))
            .body(&b"via put"[..])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
        assert_eq!(queued_files(dir.path()).len(), 1);
    }

    #[tokio::test]
    async fn get_and_head_are_liveness_probes() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, _shutdown) = start_ingest(dir.path()).await;
        let client = reqwest::Client::new();

        let get = client.get(format!("http://{addr}/")).send().await.unwrap();
        assert_eq!(get.status(), reqwest::StatusCode::NO_CONTENT);

        let head = client.head(format!("http://{addr}/")).send().await.unwrap();
        assert_eq!(head.status(), reqwest::StatusCode::NO_CONTENT);

        assert!(queued_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn stalled_body_is_rejected_at_the_read_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, _shutdown) =
            start_ingest_with_timeout(dir.path(), Duration::from_millis(200)).await;

        // Declare 100 bytes, send 10, and hold the connection open.
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"POST /data HTTP/1.1\r\nHost: localhost\r\nContent-Length: 100\r\n\r\npartial bo")
            .await
            .unwrap();

        let mut buf = vec![0u8; 1024];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .expect("server should answer on its own before the deadline")
            .unwrap();
        let response = String::from_utf8_lossy(&buf[..n]).to_string();
        assert!(
            response.starts_with("HTTP/1.1 400"),
            "unexpected response: {response}"
        );
        assert!(queued_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn post_without_content_length_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, _shutdown) = start_ingest(dir.path()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"POST /data HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let mut buf = vec![0u8; 1024];
        let n = stream.read(&mut buf).await.unwrap();
        let response = String::from_utf8_lossy(&buf[..n]).to_string();
        assert!(
            response.starts_with("HTTP/1.1 400"),
            "unexpected response: {response}"
        );
        assert!(queued_files(dir.path()).is_empty());
    }
}
