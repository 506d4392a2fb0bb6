use std::time::Duration;

use crate::tooling::{ToolField, ToolKind};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Answer to the "file exists, overwrite?" question, collected by the front-end
/// before a request is prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwriteDecision {
    #[default]
    Undecided,
    Confirmed,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BakeParams {
    pub config: String,
    pub input_space: String,
    pub output_space: String,
    pub format: String,
    pub shaper_size: Option<String>,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequest {
    tool: ToolKind,
    config: Option<String>,
    input_space: Option<String>,
    output_space: Option<String>,
    format: Option<String>,
    shaper_size: Option<String>,
    output: Option<String>,
    timeout: Duration,
    overwrite: OverwriteDecision,
}

impl ToolRequest {
    pub fn validate(config: impl Into<String>) -> Self {
        Self {
            tool: ToolKind::Validate,
            config: Some(config.into()),
            input_space: None,
            output_space: None,
            format: None,
            shaper_size: None,
            output: None,
            timeout: DEFAULT_TIMEOUT,
            overwrite: OverwriteDecision::Undecided,
        }
    }

    pub fn bake(params: BakeParams) -> Self {
        let BakeParams {
            config,
            input_space,
            output_space,
            format,
            shaper_size,
            output,
        } = params;
        Self {
            tool: ToolKind::Bake,
            config: Some(config),
            input_space: Some(input_space),
            output_space: Some(output_space),
            format: Some(format),
            shaper_size,
            output: Some(output),
            timeout: DEFAULT_TIMEOUT,
            overwrite: OverwriteDecision::Undecided,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_overwrite(mut self, overwrite: OverwriteDecision) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn overwrite(&self) -> OverwriteDecision {
        self.overwrite
    }

    pub fn field(&self, field: ToolField) -> Option<&str> {
        match field {
            ToolField::Config => self.config.as_deref(),
            ToolField::InputSpace => self.input_space.as_deref(),
            ToolField::OutputSpace => self.output_space.as_deref(),
            ToolField::Format => self.format.as_deref(),
            ToolField::ShaperSize => self.shaper_size.as_deref(),
            ToolField::Output => self.output.as_deref(),
        }
    }

    /// Field value with surrounding whitespace removed; blank counts as absent.
    pub fn present_field(&self, field: ToolField) -> Option<&str> {
        self.field(field).map(str::trim).filter(|v| !v.is_empty())
    }

    #[cfg(test)]
    pub(crate) fn with_field(mut self, field: ToolField, value: Option<&str>) -> Self {
        let value = value.map(str::to_string);
        match field {
            ToolField::Config => self.config = value,
            ToolField::InputSpace => self.input_space = value,
            ToolField::OutputSpace => self.output_space = value,
            ToolField::Format => self.format = value,
            ToolField::ShaperSize => self.shaper_size = value,
            ToolField::Output => self.output = value,
        }
        self
    }
}
