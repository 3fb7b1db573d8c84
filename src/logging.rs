//! Logging bootstrap.
//!
//! The subscriber is installed before the configuration is read so that
//! config warnings are visible. It starts at `RUST_LOG` (or `info`) and
//! switches to the configured level once that is known, unless `RUST_LOG`
//! was set.

use tracing::Subscriber;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};

const PROVISIONAL_LEVEL: &str = "info";

/// Handle to the installed subscriber's filter.
pub struct Logging {
    filter: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

impl Logging {
    /// Installs the global subscriber writing to stdout.
    pub fn init() -> Self {
        let (subscriber, logging) = Self::build(std::io::stdout);
        subscriber.init();
        logging
    }

    /// Builds the subscriber without installing it.
    pub fn build<W>(make_writer: W) -> (impl Subscriber + Send + Sync + 'static, Self)
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let (initial, from_env) = match EnvFilter::try_from_default_env() {
            Ok(filter) => (filter, true),
            Err(_) => (EnvFilter::new(PROVISIONAL_LEVEL), false),
        };
        let (filter, handle) = reload::Layer::new(initial);
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(make_writer));

        (
            subscriber,
            Self {
                filter: handle,
                from_env,
            },
        )
    }

    /// Switches to the configured level. `RUST_LOG` wins when set.
    pub fn apply_level(&self, level: &str) -> Result<(), reload::Error> {
        if self.from_env {
            return Ok(());
        }
        self.filter.reload(EnvFilter::new(level))
    }
}
