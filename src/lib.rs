pub mod config;
pub mod error;
pub mod file_handler;
pub mod manifest;
pub mod mapper;
pub mod naming;
pub mod pipeline;
pub mod predictor;
pub mod restorer;

pub use error::*;

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber on stderr. `RUST_LOG` wins; otherwise `info`, or
/// `debug` for this crate when `verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "info,nnunet_relay=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
