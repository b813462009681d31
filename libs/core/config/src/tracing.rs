use crate::Environment;
use tracing::{debug, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Default filter outside production. The AMQP client is chatty at debug
/// level, so it stays at warn unless `RUST_LOG` says otherwise.
const DEVELOPMENT_FILTER: &str = "debug,lapin=warn,amqp_rs=warn,pinky_swear=warn";
const PRODUCTION_FILTER: &str = "info,lapin=warn,amqp_rs=warn,pinky_swear=warn";

/// Install the color-eyre report hook.
///
/// Call once at the top of `main()`. Repeated calls are ignored.
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

fn default_filter(environment: &Environment) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if environment.is_production() {
            EnvFilter::new(PRODUCTION_FILTER)
        } else {
            EnvFilter::new(DEVELOPMENT_FILTER)
        }
    })
}

/// Initialize the global tracing subscriber.
///
/// - **Production** (`APP_ENV=production`): flattened JSON events for log
///   aggregation, module targets hidden.
/// - **Development**: pretty, human-readable output.
///
/// Both include `tracing_error::ErrorLayer` so eyre reports carry span traces.
/// `RUST_LOG` overrides the default filter. Safe to call more than once; later
/// calls leave the first subscriber in place.
pub fn init_tracing(environment: &Environment) {
    let filter = default_filter(environment);

    let result = if environment.is_production() {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .flatten_event(true),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false)
                    .pretty(),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    };

    match result {
        Ok(_) => info!(environment = ?environment, "Tracing initialized"),
        Err(_) => debug!("Tracing already initialized, skipping re-initialization"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_keeps_amqp_client_quiet() {
        temp_env::with_var_unset("RUST_LOG", || {
            let filter = default_filter(&Environment::Development).to_string();
            assert!(filter.contains("lapin=warn"));

            let filter = default_filter(&Environment::Production).to_string();
            assert!(filter.starts_with("info"));
        });
    }

    #[test]
    fn test_rust_log_overrides_default_filter() {
        temp_env::with_var("RUST_LOG", Some("trace"), || {
            let filter = default_filter(&Environment::Production).to_string();
            assert_eq!(filter, "trace");
        });
    }

    #[test]
    fn test_init_tracing_multiple_calls() {
        init_tracing(&Environment::Development);
        init_tracing(&Environment::Production);
    }
}
