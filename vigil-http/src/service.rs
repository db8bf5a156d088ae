use crate::handler::{RemoteAddr, WrappingHandler};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::response::Response;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
struct Dispatch {
    handler: Arc<WrappingHandler>,
    body_limit: usize,
}

/// Mount `handler` as the fallback of an axum router.
///
/// Bodies are buffered up to `body_limit` bytes; larger ones are answered
/// with 413 and still logged. Serve the router with
/// `into_make_service_with_connect_info::<SocketAddr>()` so the peer address
/// reaches the access log.
pub fn into_router(handler: Arc<WrappingHandler>, body_limit: usize) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(Dispatch { handler, body_limit })
}

async fn dispatch(State(dispatch): State<Dispatch>, req: Request) -> Response {
    let (mut parts, body) = req.into_parts();
    if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>().cloned() {
        parts.extensions.insert(RemoteAddr(peer.to_string()));
    }

    let body = match to_bytes(body, dispatch.body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(
                method = %parts.method,
                uri = %parts.uri,
                limit = dispatch.body_limit,
                error = %e,
                "Request body rejected"
            );
            let req = http::Request::from_parts(parts, Bytes::new());
            return dispatch
                .handler
                .refuse(&req, StatusCode::PAYLOAD_TOO_LARGE, "request body too large")
                .map(Body::from);
        }
    };

    let response = dispatch
        .handler
        .handle(http::Request::from_parts(parts, body))
        .await;
    response.map(Body::from)
}
