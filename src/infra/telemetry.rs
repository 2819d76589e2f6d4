use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register units and help text for the cache metrics.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "sander_cache_hit_total",
            Unit::Count,
            "Total number of response-cache hits."
        );
        describe_counter!(
            "sander_cache_miss_total",
            Unit::Count,
            "Total number of response-cache misses."
        );
        describe_counter!(
            "sander_cache_evict_total",
            Unit::Count,
            "Total number of response-cache evictions, from capacity pressure or explicit remove-oldest."
        );
        describe_counter!(
            "sander_cache_compress_error_total",
            Unit::Count,
            "Total number of responses not cached because compression failed."
        );
        describe_counter!(
            "sander_cache_uncompress_error_total",
            Unit::Count,
            "Total number of cached entries that failed to decompress."
        );
        describe_counter!(
            "sander_cache_populate_dropped_total",
            Unit::Count,
            "Total number of population jobs dropped due to a full queue."
        );
        describe_gauge!(
            "sander_cache_entries",
            Unit::Count,
            "Current number of entries in the response cache."
        );
    });
}
