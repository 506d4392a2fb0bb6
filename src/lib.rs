pub mod catalog;
pub mod report;
pub mod session;
pub mod settings;
pub mod tooling;

pub use catalog::{ColorspaceCatalog, LoadError};
pub use report::{Classification, OutcomeReporter, ReportedResult};
pub use session::{SessionError, ToolSession};
pub use settings::{SettingsError, SettingsOverlay, ToolkitSettings};
pub use tooling::{
    BakeParams, CancelHandle, ExitStatus, InvocationHandle, InvocationOutcome, LutFormat,
    ToolInvoker, ToolKind, ToolRequest, ValidationError,
};
