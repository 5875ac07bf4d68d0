use std::sync::Arc;

use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "user_auth_api=debug,lambda=debug,tower_http=info";

/// The current time in UTC, truncated to millisecond precision.
///
/// BSON datetimes only store milliseconds, so every timestamp the service
/// hands out is truncated the same way it will be after a round trip.
pub fn now() -> OffsetDateTime {
    truncate_to_millis(OffsetDateTime::now_utc())
}

pub fn truncate_to_millis(time: OffsetDateTime) -> OffsetDateTime {
    let millis = time.millisecond();
    time.replace_nanosecond(u32::from(millis) * 1_000_000)
        .unwrap_or(time)
}

/// A source of "now", swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        now()
    }
}

/// A clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. JSON output is used when
/// `LOG_FORMAT=json` or when `force_json` is set (CloudWatch ingests JSON lines).
pub fn init_tracing(force_json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json_logs = force_json
        || std::env::var("LOG_FORMAT")
            .map(|format| format == "json")
            .unwrap_or(false);

    let result = if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).try_init()
    };

    if let Err(err) = result {
        eprintln!("tracing subscriber already installed: {err}");
    }
}
