use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Metrics collector. Every counter is gated behind `enabled`.
///
/// When `enabled = false` no prometheus Registry is created and every
/// `record_*` call returns immediately.
pub struct MetricsCollector {
    enabled: bool,
    registry: Option<Registry>,
    pub http_requests_total: Option<IntCounterVec>,
    pub http_request_duration: Option<Histogram>,
    pub access_events_dropped: Option<IntCounter>,
    pub handler_panics: Option<IntCounter>,
    pub admission_rejections: Option<IntCounterVec>,
}

impl MetricsCollector {
    /// Create a new collector. When `enabled = false`, everything is None.
    pub fn new(enabled: bool) -> anyhow::Result<Self> {
        if !enabled {
            return Ok(Self::disabled());
        }

        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("vigil_http_requests_total", "Total HTTP requests"),
            &["method", "status"],
        )?;

        let http_request_duration = Histogram::with_opts(
            HistogramOpts::new("vigil_http_request_duration_seconds", "Request latency").buckets(
                vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            ),
        )?;

        let access_events_dropped = IntCounter::new(
            "vigil_access_events_dropped_total",
            "Access events lost to full or closed sinks",
        )?;

        let handler_panics =
            IntCounter::new("vigil_handler_panics_total", "Panics caught in inner handlers")?;

        let admission_rejections = IntCounterVec::new(
            Opts::new("vigil_admission_rejections_total", "Requests rejected before the handler"),
            &["reason"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(access_events_dropped.clone()))?;
        registry.register(Box::new(handler_panics.clone()))?;
        registry.register(Box::new(admission_rejections.clone()))?;

        Ok(Self {
            enabled: true,
            registry: Some(registry),
            http_requests_total: Some(http_requests_total),
            http_request_duration: Some(http_request_duration),
            access_events_dropped: Some(access_events_dropped),
            handler_panics: Some(handler_panics),
            admission_rejections: Some(admission_rejections),
        })
    }

    /// No-op collector.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            registry: None,
            http_requests_total: None,
            http_request_duration: None,
            access_events_dropped: None,
            handler_panics: None,
            admission_rejections: None,
        }
    }

    /// Record a completed request (no-op when disabled).
    #[inline]
    pub fn record_request(&self, method: &str, status: u16, duration_secs: f64) {
        if !self.enabled {
            return;
        }
        if let Some(ref counter) = self.http_requests_total {
            let mut buf = itoa::Buffer::new();
            let status_str = buf.format(status);
            counter.with_label_values(&[method, status_str]).inc();
        }
        if let Some(ref hist) = self.http_request_duration {
            hist.observe(duration_secs);
        }
    }

    #[inline]
    pub fn record_dropped_event(&self) {
        if let Some(ref counter) = self.access_events_dropped {
            counter.inc();
        }
    }

    #[inline]
    pub fn record_panic(&self) {
        if let Some(ref counter) = self.handler_panics {
            counter.inc();
        }
    }

    /// `reason` is `"method"` or `"media_type"`.
    #[inline]
    pub fn record_rejection(&self, reason: &str) {
        if let Some(ref counter) = self.admission_rejections {
            counter.with_label_values(&[reason]).inc();
        }
    }

    /// Render prometheus text exposition format.
    pub fn render(&self) -> String {
        if let Some(ref registry) = self.registry {
            let mut buffer = Vec::new();
            TextEncoder::new()
                .encode(&registry.gather(), &mut buffer)
                .unwrap_or(());
            String::from_utf8(buffer).unwrap_or_default()
        } else {
            String::new()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
