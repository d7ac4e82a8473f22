use async_trait::async_trait;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Request handler invoked once per inbound request, together with the
/// peer address of the connection the request arrived on.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(
        &self,
        req: Request<Incoming>,
        peer: SocketAddr,
    ) -> Response<BoxBody<Bytes, Infallible>>;
}

/// Bind `host:port` and serve until the shutdown flag flips.
pub async fn serve<H>(
    host: &str,
    port: u16,
    shutdown: watch::Receiver<bool>,
    handler: Arc<H>,
) -> io::Result<()>
where
    H: Handler,
{
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    serve_on(listener, shutdown, handler).await
}

/// Accept loop over an already-bound listener. Separate from [`serve`] so
/// tests can bind to port 0 and recover the assigned address.
pub async fn serve_on<H>(
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
    handler: Arc<H>,
) -> io::Result<()>
where
    H: Handler,
{
    loop {
        let (stream, peer_addr) = tokio::select! {
            res = listener.accept() => res?,
            _ = shutdown.changed() => {
                tracing::info!("listener stopping");
                return Ok(());
            }
        };
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let handler = handler.clone();

        // Hand the connection to hyper; auto-detect h1/h2 on this socket
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(handler.handle(req, peer_addr).await) }
            });
            let _ = Builder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await;
        });
    }
}

pub fn no_content() -> Response<BoxBody<Bytes, Infallible>> {
    status_only(StatusCode::NO_CONTENT)
}

pub fn status_only(status: StatusCode) -> Response<BoxBody<Bytes, Infallible>> {
    let mut res = Response::new(Empty::<Bytes>::new().boxed());
    *res.status_mut() = status;
    res
}
