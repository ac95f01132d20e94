//! Tracing setup for binaries embedding the scanner.

use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "mongo_scanner=warn";
const VERBOSE_LOG_FILTER: &str = "mongo_scanner=debug";

/// Install a stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks between warnings only
/// and full connection lifecycle output. Calling this twice is harmless: the
/// second call leaves the first subscriber in place and returns `false`.
pub fn init_logging(verbose: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            VERBOSE_LOG_FILTER
        } else {
            DEFAULT_LOG_FILTER
        })
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
