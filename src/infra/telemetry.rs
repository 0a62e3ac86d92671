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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "beacon_cache_hit_total",
            Unit::Count,
            "Committee requests answered from the cache."
        );
        describe_counter!(
            "beacon_cache_miss_total",
            Unit::Count,
            "Committee requests with no cached record."
        );
        describe_counter!(
            "beacon_cache_store_total",
            Unit::Count,
            "Records persisted to the data directory."
        );
        describe_counter!(
            "beacon_cache_corrupt_total",
            Unit::Count,
            "Records deleted because they failed to decode."
        );
        describe_counter!(
            "beacon_cache_warm_read_total",
            Unit::Count,
            "Records pre-loaded into the warm store by read-ahead."
        );
        describe_counter!(
            "beacon_cache_warm_evict_total",
            Unit::Count,
            "Warm store evictions due to capacity."
        );
        describe_counter!(
            "beacon_cache_pruned_total",
            Unit::Count,
            "Records deleted by retention pruning."
        );
        describe_gauge!(
            "beacon_cache_warmed_epoch",
            Unit::Count,
            "Last finalized epoch stored by the warming loop."
        );
    });
}
