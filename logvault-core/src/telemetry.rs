//! Telemetry handle built once at process start and passed down explicitly.
//!
//! No global subscriber is installed. Work runs under the handle's
//! dispatcher via [`Telemetry::scope`], and every spawned task must be
//! wrapped the same way to keep its log lines.

use std::future::Future;
use tracing::instrument::{Instrument, WithSubscriber};
use tracing::{Dispatch, Span};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::error::ArchiverError;

#[derive(Clone)]
pub struct Telemetry {
    dispatch: Dispatch,
    span: Span,
    run_id: Uuid,
}

impl Telemetry {
    /// Build a stderr `fmt` subscriber. `RUST_LOG` takes precedence over
    /// `service.log_level`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ArchiverError> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
                ArchiverError::Configuration(format!(
                    "invalid service.log_level '{}': {}",
                    config.log_level, e
                ))
            })?,
        };

        let subscriber = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish();

        Ok(Self::with_dispatch(Dispatch::new(subscriber)))
    }

    /// A handle that drops every event.
    pub fn disabled() -> Self {
        Self::with_dispatch(Dispatch::none())
    }

    pub fn with_dispatch(dispatch: Dispatch) -> Self {
        let run_id = Uuid::new_v4();
        let span = tracing::dispatcher::with_default(&dispatch, || {
            tracing::info_span!("archive_run", run_id = %run_id)
        });
        Self {
            dispatch,
            span,
            run_id,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Run `fut` under this handle's dispatcher and root span.
    pub fn scope<F: Future>(&self, fut: F) -> impl Future<Output = F::Output> {
        fut.instrument(self.span.clone())
            .with_subscriber(self.dispatch.clone())
    }

    /// Synchronous counterpart of [`Telemetry::scope`].
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, || self.span.in_scope(f))
    }
}
