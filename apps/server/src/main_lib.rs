use std::sync::Arc;

use crate::{
    config::{Config, LogFormat},
    events::EventBus,
    live_updates::WebLiveEventSink,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub struct AppState {
    pub event_bus: EventBus,
    /// Live event sink handed to request handlers; owns the flush worker.
    pub live_sink: Arc<WebLiveEventSink>,
}

impl AppState {
    /// Flushes pending live updates to connected clients, then ends their streams.
    pub async fn shutdown(&self) {
        self.live_sink.shutdown().await;
        self.event_bus.close_streams();
    }
}

pub fn init_tracing(log_format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init(),
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let event_bus = EventBus::new(config.event_bus_capacity);

    let live_sink = Arc::new(WebLiveEventSink::new(
        event_bus.clone(),
        config.batch_interval,
    ));
    live_sink.start_worker();
    tracing::info!(
        "Publication updates are flushed every {}s",
        config.batch_interval.as_secs()
    );

    Ok(Arc::new(AppState {
        event_bus,
        live_sink,
    }))
}
