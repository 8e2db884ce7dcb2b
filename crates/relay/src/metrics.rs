//! Prometheus metrics for the relay

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct RelayMetrics {
    pub registry: Registry,
    /// Frames answered, by `result` (ack/nak)
    pub frames: IntCounterVec,
    /// Rejected frames by `reason`
    pub frame_errors: IntCounterVec,
    pub source_connections: IntGauge,
    pub listeners: IntGauge,
    pub sources_known: IntGauge,
    pub lines_broadcast: IntCounter,
    pub listeners_dropped: IntCounter,
}

impl RelayMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let frames = IntCounterVec::new(
            Opts::new("relay_frames_total", "Source frames answered"),
            &["result"],
        )
        .expect("valid frames_total metric");

        let frame_errors = IntCounterVec::new(
            Opts::new("relay_frame_errors_total", "Source frames rejected"),
            &["reason"],
        )
        .expect("valid frame_errors_total metric");

        let source_connections = IntGauge::new(
            "relay_source_connections",
            "Currently open source connections",
        )
        .expect("valid source_connections metric");

        let listeners = IntGauge::new("relay_listeners", "Currently registered listeners")
            .expect("valid listeners metric");

        let sources_known = IntGauge::new("relay_sources_known", "Sources ever accepted")
            .expect("valid sources_known metric");

        let lines_broadcast = IntCounter::new(
            "relay_lines_broadcast_total",
            "Field lines queued to listeners",
        )
        .expect("valid lines_broadcast_total metric");

        let listeners_dropped = IntCounter::new(
            "relay_listeners_dropped_total",
            "Listeners removed after a failed write",
        )
        .expect("valid listeners_dropped_total metric");

        registry.register(Box::new(frames.clone())).expect("register frames_total");
        registry
            .register(Box::new(frame_errors.clone()))
            .expect("register frame_errors_total");
        registry
            .register(Box::new(source_connections.clone()))
            .expect("register source_connections");
        registry.register(Box::new(listeners.clone())).expect("register listeners");
        registry
            .register(Box::new(sources_known.clone()))
            .expect("register sources_known");
        registry
            .register(Box::new(lines_broadcast.clone()))
            .expect("register lines_broadcast_total");
        registry
            .register(Box::new(listeners_dropped.clone()))
            .expect("register listeners_dropped_total");

        Self {
            registry,
            frames,
            frame_errors,
            source_connections,
            listeners,
            sources_known,
            lines_broadcast,
            listeners_dropped,
        }
    }

    pub fn inc_ack(&self) {
        self.frames.with_label_values(&["ack"]).inc();
    }

    pub fn inc_nak(&self, reason: &str) {
        self.frames.with_label_values(&["nak"]).inc();
        self.frame_errors.with_label_values(&[reason]).inc();
    }

    /// Encode all metrics to Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
        })
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
