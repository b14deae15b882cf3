// This file is part of Bundleguard.
//
// Bundleguard is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Bundleguard is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Bundleguard.
// If not, see https://www.gnu.org/licenses/.

use std::io;

pub use tracing::*;
use tracing::{subscriber, subscriber::Interest, Metadata, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, FmtSubscriber, Layer};

use super::LogsArgs;

/// Directives used when `RUST_LOG` is not set
const DEFAULT_DIRECTIVES: &str = "bundleguard=info,bundleguard_sim=info,warn";

/// Crates too chatty to ever log
const BLACKLISTED_TARGETS: &[&str] = &["ethers", "mio"];

/// Install the global subscriber. Logs go to stderr unless a file is given,
/// keeping stdout for the validation report.
pub fn configure_logging(config: &LogsArgs) -> anyhow::Result<WorkerGuard> {
    let (appender, guard) = if let Some(log_file) = &config.file {
        tracing_appender::non_blocking(tracing_appender::rolling::never(".", log_file))
    } else {
        tracing_appender::non_blocking(io::stderr())
    };

    let subscriber_builder = FmtSubscriber::builder()
        .with_env_filter(env_filter(
            std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(),
        ))
        .with_writer(appender);
    if config.json {
        subscriber::set_global_default(
            subscriber_builder
                .json()
                .finish()
                .with(TargetBlacklistLayer),
        )?;
    } else {
        subscriber::set_global_default(
            subscriber_builder
                .compact()
                .finish()
                .with(TargetBlacklistLayer),
        )?;
    }

    // Redirect logs from external crates using `log` to the tracing subscriber
    LogTracer::init()?;

    Ok(guard)
}

fn env_filter(directives: Option<&str>) -> EnvFilter {
    match directives {
        Some(d) if !d.trim().is_empty() => EnvFilter::new(d),
        _ => EnvFilter::new(DEFAULT_DIRECTIVES),
    }
}

fn is_blacklisted(target: &str) -> bool {
    BLACKLISTED_TARGETS
        .iter()
        .any(|blacklisted| target.starts_with(blacklisted))
}

struct TargetBlacklistLayer;

impl<S: Subscriber> Layer<S> for TargetBlacklistLayer {
    fn register_callsite(&self, metadata: &'static Metadata<'static>) -> Interest {
        if is_blacklisted(metadata.target()) {
            Interest::never()
        } else {
            Interest::always()
        }
    }
}
