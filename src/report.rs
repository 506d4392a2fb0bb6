pub mod audit_log;

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

pub use audit_log::AuditLog;

use crate::tooling::execute::{ExitStatus, InvocationOutcome};
use crate::tooling::prepare::{ToolInvoker, ValidationError};
use crate::tooling::request::ToolRequest;
use crate::tooling::ToolKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Success,
    ToolFailure,
    LaunchFailure,
    ValidationRejected,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ToolFailure => "tool_failure",
            Self::LaunchFailure => "launch_failure",
            Self::ValidationRejected => "validation_rejected",
        }
    }

    // Cancelled runs never completed, same as launch failures and timeouts.
    pub fn of_exit_status(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Exited(0) => Self::Success,
            ExitStatus::Exited(_) => Self::ToolFailure,
            ExitStatus::DidNotLaunch | ExitStatus::TimedOut | ExitStatus::Cancelled => {
                Self::LaunchFailure
            }
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedResult {
    pub classification: Classification,
    pub exit_status: Option<ExitStatus>,
    pub display_text: String,
    pub audit_line: String,
}

impl ReportedResult {
    pub fn is_success(&self) -> bool {
        self.classification == Classification::Success
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutcomeReporter {
    audit_log: Option<AuditLog>,
}

impl OutcomeReporter {
    pub fn new(audit_log: Option<AuditLog>) -> Self {
        Self { audit_log }
    }

    pub fn audit_log(&self) -> Option<&AuditLog> {
        self.audit_log.as_ref()
    }

    pub fn classify(&self, outcome: &InvocationOutcome) -> ReportedResult {
        let classification = Classification::of_exit_status(outcome.exit_status);
        ReportedResult {
            classification,
            exit_status: Some(outcome.exit_status),
            display_text: format!("{}\n{}", outcome.stdout, outcome.stderr),
            audit_line: format_audit_line(
                outcome.finished_at,
                outcome.tool,
                outcome.target.as_str(),
                classification,
            ),
        }
    }

    pub fn report(&self, outcome: &InvocationOutcome) -> ReportedResult {
        let result = self.classify(outcome);
        self.append(&result);
        result
    }

    /// Builds a `ValidationRejected` result. The audit target is resolved by
    /// `invoker` so it names the same file a successful run would.
    pub fn reject(
        &self,
        invoker: &ToolInvoker,
        request: &ToolRequest,
        error: &ValidationError,
    ) -> ReportedResult {
        let target = invoker.target_name(request);
        let result = ReportedResult {
            classification: Classification::ValidationRejected,
            exit_status: None,
            display_text: error.to_string(),
            audit_line: format_audit_line(
                Utc::now(),
                request.tool(),
                target.as_str(),
                Classification::ValidationRejected,
            ),
        };
        self.append(&result);
        result
    }

    fn append(&self, result: &ReportedResult) {
        if let Some(log) = self.audit_log.as_ref() {
            log.append_line(result.audit_line.as_str());
        }
    }
}

pub fn format_audit_line(
    at: DateTime<Utc>,
    tool: ToolKind,
    target: &str,
    classification: Classification,
) -> String {
    format!(
        "{} - {} - {} - {}",
        at.to_rfc3339_opts(SecondsFormat::Millis, true),
        tool,
        target,
        classification
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColorspaceCatalog;
    use crate::tooling::request::BakeParams;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use uuid::Uuid;

    fn outcome(exit_status: ExitStatus, stdout: &str, stderr: &str) -> InvocationOutcome {
        InvocationOutcome {
            invocation_id: Uuid::nil(),
            tool: ToolKind::Bake,
            target: String::from("look.cube"),
            exit_status,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration: Duration::from_millis(42),
            finished_at: Utc
                .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
                .single()
                .expect("valid timestamp"),
        }
    }

    #[test]
    fn exit_zero_with_ok_is_success_with_trailing_newline() {
        let result = OutcomeReporter::default().classify(&outcome(ExitStatus::Exited(0), "OK", ""));
        assert_eq!(result.classification, Classification::Success);
        assert_eq!(result.display_text, "OK\n");
        assert!(result.is_success());
    }

    #[test]
    fn maps_exit_statuses_to_classifications() {
        for code in [1, 2, 127, 255, -1] {
            assert_eq!(
                Classification::of_exit_status(ExitStatus::Exited(code)),
                Classification::ToolFailure,
                "code={code}"
            );
        }
        assert_eq!(
            Classification::of_exit_status(ExitStatus::DidNotLaunch),
            Classification::LaunchFailure
        );
        assert_eq!(
            Classification::of_exit_status(ExitStatus::TimedOut),
            Classification::LaunchFailure
        );
        assert_eq!(
            Classification::of_exit_status(ExitStatus::Cancelled),
            Classification::LaunchFailure
        );
    }

    #[test]
    fn display_text_keeps_tool_output_verbatim() {
        let result = OutcomeReporter::default().classify(&outcome(
            ExitStatus::Exited(1),
            "  checking roles...\n",
            "ERROR: missing colorspace 'lin'\r\n",
        ));
        assert_eq!(
            result.display_text,
            "  checking roles...\n\nERROR: missing colorspace 'lin'\r\n"
        );
        assert_eq!(result.classification, Classification::ToolFailure);
    }

    #[test]
    fn classify_is_idempotent() {
        let reporter = OutcomeReporter::default();
        let outcome = outcome(ExitStatus::TimedOut, "partial", "killed");
        assert_eq!(reporter.classify(&outcome), reporter.classify(&outcome));
    }

    #[test]
    fn audit_line_has_timestamp_tool_target_and_classification() {
        let result =
            OutcomeReporter::default().classify(&outcome(ExitStatus::DidNotLaunch, "", "nope"));
        assert_eq!(
            result.audit_line,
            "2024-03-09T14:05:07.000Z - bake - look.cube - launch_failure"
        );
    }

    #[test]
    fn rejection_uses_error_message_and_target_file_name() {
        let request = ToolRequest::validate("/studio/show/config.ocio");
        let result = OutcomeReporter::default().reject(
            &ToolInvoker::default(),
            &request,
            &ValidationError::InvocationInProgress,
        );
        assert_eq!(result.classification, Classification::ValidationRejected);
        assert_eq!(result.exit_status, None);
        assert_eq!(result.display_text, "Another invocation is still in progress");
        assert!(result
            .audit_line
            .ends_with(" - validate - config.ocio - validation_rejected"));
    }

    #[test]
    fn rejected_bake_audits_the_same_file_a_run_would_write() {
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("ocio_toolkit_report_target_{stamp}"));
        let invoker = ToolInvoker::default().with_output_root(root.as_path());
        let request = ToolRequest::bake(BakeParams {
            config: String::from("/studio/config.ocio"),
            input_space: String::from("ACES"),
            output_space: String::from("sRGB"),
            format: String::from("CUBE"),
            shaper_size: None,
            output: String::from("shows/look"),
        });

        let prepared = invoker
            .prepare(&request, &ColorspaceCatalog::empty())
            .expect("bake should prepare");
        let result = OutcomeReporter::default().reject(
            &invoker,
            &request,
            &ValidationError::OutputExists {
                path: root.join("shows/look.cube").display().to_string(),
            },
        );

        assert_eq!(prepared.target, "look.cube");
        assert!(result
            .audit_line
            .ends_with(" - bake - look.cube - validation_rejected"));
        let _ = std::fs::remove_dir_all(root);
    }
}
