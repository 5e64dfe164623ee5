//! Logging setup for the binaries.
//!
//! Library code only emits `tracing` events; the CLI calls [`init`] once.
//! `RUST_LOG` takes precedence over the `[logging]` config section:
//!
//! ```toml
//! [logging]
//! default = "info"
//!
//! [logging.modules]
//! coursedb_vector = "debug"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static INIT: Once = Once::new();

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub default: String,
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { default: "info".to_string(), modules: BTreeMap::new() }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directive string, e.g. `info,coursedb_vector=debug`.
    pub fn directives(&self) -> String {
        let mut filter = self.default.clone();
        for (module, level) in &self.modules {
            filter.push_str(&format!(",{module}={level}"));
        }
        filter
    }
}

/// HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Install the global subscriber. Only the first call has an effect.
pub fn init(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(config.directives())
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}
