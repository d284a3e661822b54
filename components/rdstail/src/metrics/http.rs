// External crates
use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    body::Incoming,
    header::{CONTENT_TYPE, HeaderValue},
    http::{Method, Request, Response, StatusCode},
    service::service_fn,
};
use hyper_util::{rt::TokioExecutor, server::conn::auto::Builder as HyperServerBuilder};
use prometheus::{Encoder, TextEncoder};
use std::{convert::Infallible, net::SocketAddr};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Encode every registered metric in the Prometheus text format.
pub fn render_metrics() -> (String, Vec<u8>) {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode prometheus metrics");
    }
    (encoder.format_type().to_string(), buffer)
}

fn respond(req: &Request<Incoming>) -> Response<Full<Bytes>> {
    if req.method() == Method::GET && req.uri().path() == "/metrics" {
        let (content_type, body) = render_metrics();
        let mut response = Response::new(Full::new(Bytes::from(body)));
        if let Ok(value) = content_type.parse::<HeaderValue>() {
            response.headers_mut().insert(CONTENT_TYPE, value);
        }
        return response;
    }

    let mut not_found = Response::new(Full::new(Bytes::from_static(b"Not Found")));
    *not_found.status_mut() = StatusCode::NOT_FOUND;
    not_found
}

/// Serve `GET /metrics` on `addr` until `cancel` fires.
#[instrument(
    name = "rdstail_metrics::serve",
    target = "metrics::http",
    skip(cancel),
    level = "debug"
)]
pub async fn serve_metrics(addr: SocketAddr, cancel: CancellationToken) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(metrics_endpoint = %addr, "Metrics available at http://{addr}/metrics");

    loop {
        let (stream, _) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted?,
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let service = service_fn(|req: Request<Incoming>| async move {
            Ok::<_, Infallible>(respond(&req))
        });

        tokio::spawn(async move {
            if let Err(err) = HyperServerBuilder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                tracing::error!(error = %err, "Metrics server connection error");
            }
        });
    }
}
