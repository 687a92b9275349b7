use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize structured logging with environment-based filtering.
///
/// Defaults to `info,customer_loyalty=debug`; override with `RUST_LOG`,
/// e.g. `RUST_LOG=customer_loyalty=trace`.
/// Call before anything else logs; `RUST_LOG` may come from `.env`.
pub fn init_tracing() {
    let _ = dotenvy::dotenv();

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,customer_loyalty=debug")),
        )
        .try_init();
}
