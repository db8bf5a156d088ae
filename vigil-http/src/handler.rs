use crate::error_body::write_error;
use crate::guard::{Admission, AdmissionGuard};
use crate::recovery::run_guarded;
use crate::writer::{ObservingWriter, ResponseBuffer, ResponseWriter};
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderValue, Request, Response, StatusCode, header};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use vigil_core::config::HandlerConfig;
use vigil_core::{AccessEvent, NegotiationHeader, VigilError};
use vigil_observability::{MetricsCollector, SinkRegistry};

/// Anything that can answer a request through a [`ResponseWriter`].
///
/// Implementations may panic; [`WrappingHandler`] survives it.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, req: &Request<Bytes>, w: &mut dyn ResponseWriter);
}

/// Adapter for synchronous closures, see [`handler_fn`].
pub struct FnHandler<F>(F);

/// Turn a closure into a [`Handler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&Request<Bytes>, &mut dyn ResponseWriter) + Send + Sync,
{
    FnHandler(f)
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&Request<Bytes>, &mut dyn ResponseWriter) + Send + Sync,
{
    async fn serve(&self, req: &Request<Bytes>, w: &mut dyn ResponseWriter) {
        (self.0)(req, w)
    }
}

/// Connection peer as `ip:port`, put into request extensions by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddr(pub String);

/// Decorates one inner handler with admission checks, panic recovery and
/// access events.
///
/// Every call to [`Handler::serve`] publishes exactly one [`AccessEvent`],
/// whether the request was rejected, served, or the inner handler panicked.
pub struct WrappingHandler {
    inner: Arc<dyn Handler>,
    content_type: Option<HeaderValue>,
    guard: AdmissionGuard,
    sinks: Arc<SinkRegistry>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl WrappingHandler {
    pub fn new(
        inner: Arc<dyn Handler>,
        content_type: Option<&str>,
        sinks: Arc<SinkRegistry>,
    ) -> Result<Self, VigilError> {
        let content_type = content_type
            .map(|ct| {
                HeaderValue::from_str(ct).map_err(|_| VigilError::InvalidMediaType(ct.to_string()))
            })
            .transpose()?;
        Ok(Self {
            inner,
            content_type,
            guard: AdmissionGuard::new(),
            sinks,
            metrics: None,
        })
    }

    /// Build from the `handler` section of the config file.
    pub fn from_config(
        inner: Arc<dyn Handler>,
        config: &HandlerConfig,
        sinks: Arc<SinkRegistry>,
    ) -> Result<Self, VigilError> {
        let mut handler = Self::new(inner, config.content_type.as_deref(), sinks)?;
        if let Some(ref accept) = config.accept {
            handler.set_accepted_type(accept)?;
        }
        handler.set_allowed_methods(&config.allow)?;
        handler.set_negotiation_header(config.negotiation);
        Ok(handler)
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Setup-time only.
    pub fn set_accepted_type(&mut self, mime: &str) -> Result<(), VigilError> {
        self.guard.set_accepted_type(mime)
    }

    /// Setup-time only.
    pub fn set_allowed_methods<I, S>(&mut self, methods: I) -> Result<(), VigilError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.guard.set_allowed_methods(methods)
    }

    pub fn set_negotiation_header(&mut self, negotiation: NegotiationHeader) {
        self.guard.set_negotiation_header(negotiation);
    }

    pub fn guard(&self) -> &AdmissionGuard {
        &self.guard
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_ref().and_then(|ct| ct.to_str().ok())
    }

    /// Serve into an in-memory buffer and return the finished response.
    pub async fn handle(&self, req: Request<Bytes>) -> Response<Bytes> {
        let mut buffer = ResponseBuffer::new();
        self.serve(&req, &mut buffer).await;
        buffer.into_response()
    }

    /// Answer `status` without running the guard or the inner handler.
    ///
    /// For transports that turn a request away before it is complete, such
    /// as an oversized body. The access event is still published.
    pub fn refuse(&self, req: &Request<Bytes>, status: StatusCode, message: &str) -> Response<Bytes> {
        let start = Instant::now();
        let mut buffer = ResponseBuffer::new();
        let mut rw = ObservingWriter::new(&mut buffer, self.content_type.as_ref());
        write_error(&mut rw, message, status);
        let logged = rw.status().unwrap_or(status);
        let bytes_written = rw.bytes_written();
        self.finish(req, logged, start.elapsed(), bytes_written);
        buffer.into_response()
    }

    fn finish(&self, req: &Request<Bytes>, status: StatusCode, elapsed: Duration, bytes_written: u64) {
        let event = AccessEvent {
            remote_addr: remote_addr(req),
            time: AccessEvent::now(),
            method: req.method().to_string(),
            request_uri: request_uri(req),
            proto: format!("{:?}", req.version()),
            status: status.as_u16(),
            content_length: content_length(req),
            referer: header_or_dash(req, header::REFERER),
            user_agent: header_or_dash(req, header::USER_AGENT),
            duration: elapsed,
            bytes_written,
        };
        if let Some(ref metrics) = self.metrics {
            metrics.record_request(&event.method, event.status, elapsed.as_secs_f64());
        }
        self.sinks.publish(event);
    }
}

#[async_trait]
impl Handler for WrappingHandler {
    async fn serve(&self, req: &Request<Bytes>, w: &mut dyn ResponseWriter) {
        let start = Instant::now();
        let mut rw = ObservingWriter::new(w, self.content_type.as_ref());

        let outcome = match self.guard.check(req) {
            Admission::Reject(rejection) => {
                debug!(
                    method = %req.method(),
                    uri = %req.uri(),
                    status = rejection.status().as_u16(),
                    "Request rejected by admission guard"
                );
                if let Some(ref metrics) = self.metrics {
                    metrics.record_rejection(rejection.reason());
                }
                rejection.apply(&mut rw);
                Ok(())
            }
            Admission::Admit => run_guarded(self.inner.serve(req, &mut rw)).await,
        };

        if let Err(failure) = outcome {
            if !rw.has_status() {
                rw.write_header(StatusCode::INTERNAL_SERVER_ERROR);
            }
            failure.log(req.method().as_str(), &req.uri().to_string());
            if let Some(ref metrics) = self.metrics {
                metrics.record_panic();
            }
        }

        let elapsed = start.elapsed();
        let status = rw.status().unwrap_or(StatusCode::OK);
        let bytes_written = rw.bytes_written();
        self.finish(req, status, elapsed, bytes_written);
    }
}

/// First `X-Forwarded-For` hop, else the peer IP, else `"?"`.
fn remote_addr(req: &Request<Bytes>) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').map(str::trim).find(|hop| !hop.is_empty()));
    if let Some(hop) = forwarded {
        return hop.to_string();
    }
    req.extensions()
        .get::<RemoteAddr>()
        .and_then(|RemoteAddr(addr)| addr.parse::<SocketAddr>().ok())
        .map(|peer| peer.ip().to_string())
        .unwrap_or_else(|| "?".to_string())
}

// Origin-form target; HTTP/2 hands over absolute-form URIs.
fn request_uri(req: &Request<Bytes>) -> String {
    req.uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

fn header_or_dash(req: &Request<Bytes>, name: header::HeaderName) -> String {
    req.headers()
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_else(|| "-".to_string())
}

// Declared length; -1 if the header is garbage, body size if absent.
fn content_length(req: &Request<Bytes>) -> i64 {
    match req.headers().get(header::CONTENT_LENGTH) {
        Some(v) => v
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|n| *n >= 0)
            .unwrap_or(-1),
        None => req.body().len() as i64,
    }
}
