//! ei-insights - Electric Ireland usage client
//!
//! Logs in to the Electric Ireland account portal and reads daily or
//! hourly electricity usage plus the bill projection for one account.

pub mod logging;
pub mod portal;
pub mod settings;
pub mod storage;

pub use portal::{
    Credentials, ElectricIrelandScraper, MeterIds, PortalError, PortalSession, UsageDatapoint,
};
pub use settings::PortalSettings;

use tracing_subscriber::{
    filter::Directive, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Initialize logging: stderr, plus the log file when file logging is on
pub fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("ei_insights={}", level).parse::<Directive>() {
        filter = filter.add_directive(directive);
    }

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(logging::file_writer()),
        )
        .with(filter)
        .try_init();
}
