use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::info;

use crate::catalog::{ColorspaceCatalog, LoadError};
use crate::report::{AuditLog, OutcomeReporter, ReportedResult};
use crate::settings::ToolkitSettings;
use crate::tooling::execute::{spawn_invocation, InvocationHandle};
use crate::tooling::prepare::{ToolInvoker, ValidationError};
use crate::tooling::request::ToolRequest;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Rejected(#[from] ValidationError),
    #[error("internal session failure: {0}")]
    Internal(String),
}

/// Per-user state for one front-end: the loaded catalog plus the single
/// in-flight invocation slot.
///
/// The catalog is swapped as a whole on reload; readers holding the previous
/// `Arc` keep a consistent view.
#[derive(Debug)]
pub struct ToolSession {
    invoker: ToolInvoker,
    reporter: OutcomeReporter,
    catalog: RwLock<Arc<ColorspaceCatalog>>,
    in_flight: Arc<AtomicBool>,
}

struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ToolSession {
    pub fn new(invoker: ToolInvoker, reporter: OutcomeReporter) -> Self {
        Self {
            invoker,
            reporter,
            catalog: RwLock::new(Arc::new(ColorspaceCatalog::empty())),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_settings(settings: &ToolkitSettings) -> Self {
        let mut invoker = ToolInvoker::new(settings.tools.clone());
        if let Some(root) = settings.lut_location.as_deref() {
            invoker = invoker.with_output_root(root);
        }
        let reporter = OutcomeReporter::new(settings.audit_log.clone().map(AuditLog::new));
        Self::new(invoker, reporter)
    }

    pub fn invoker(&self) -> &ToolInvoker {
        &self.invoker
    }

    pub fn reporter(&self) -> &OutcomeReporter {
        &self.reporter
    }

    /// Replaces the current catalog on success; a failed load keeps the old one.
    pub fn load_catalog(&self, path: &Path) -> Result<Arc<ColorspaceCatalog>, SessionError> {
        let loaded = Arc::new(ColorspaceCatalog::load(path)?);
        let mut slot = self
            .catalog
            .write()
            .map_err(|_| SessionError::Internal(String::from("catalog lock poisoned")))?;
        *slot = Arc::clone(&loaded);
        info!(
            config = %path.display(),
            colorspaces = loaded.names().len(),
            "colorspace catalog replaced"
        );
        Ok(loaded)
    }

    pub fn catalog(&self) -> Result<Arc<ColorspaceCatalog>, SessionError> {
        self.catalog
            .read()
            .map(|slot| Arc::clone(&*slot))
            .map_err(|_| SessionError::Internal(String::from("catalog lock poisoned")))
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Prepares and starts `request`. Only one invocation may be pending per
    /// session; a second submit fails with `InvocationInProgress`.
    ///
    /// The worker runs on the current tokio runtime; outside one this fails
    /// with `Internal` and starts nothing.
    pub fn submit(&self, request: &ToolRequest) -> Result<InvocationHandle, SessionError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(SessionError::Internal(String::from(
                "tool invocations need a running tokio runtime",
            )));
        }
        let catalog = self.catalog()?;
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ValidationError::InvocationInProgress.into());
        }
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        let prepared = self.invoker.prepare(request, catalog.as_ref())?;
        Ok(spawn_invocation(prepared, request.timeout(), guard))
    }

    /// Submits, waits and reports. Validation problems come back as a
    /// `ValidationRejected` result; only internal failures are errors.
    pub async fn run(&self, request: &ToolRequest) -> Result<ReportedResult, SessionError> {
        let handle = match self.submit(request) {
            Ok(handle) => handle,
            Err(SessionError::Rejected(error)) => {
                return Ok(self.reporter.reject(&self.invoker, request, &error));
            }
            Err(other) => return Err(other),
        };
        let outcome = handle
            .wait()
            .await
            .map_err(|e| SessionError::Internal(e.to_string()))?;
        Ok(self.reporter.report(&outcome))
    }
}
