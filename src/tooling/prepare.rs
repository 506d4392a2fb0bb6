use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog::ColorspaceCatalog;
use crate::tooling::request::{OverwriteDecision, ToolRequest};
use crate::tooling::resolve::resolve_program;
use crate::tooling::template::ToolTable;
use crate::tooling::{LutFormat, ToolField, ToolKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    MissingField { field: ToolField },
    #[error("Colorspace '{name}' ({field}) is not declared by the loaded config")]
    UnknownColorspace { field: ToolField, name: String },
    #[error("Unsupported LUT format '{0}'")]
    UnsupportedFormat(String),
    #[error("Shaper size '{0}' must be a positive integer")]
    InvalidShaperSize(String),
    #[error("Output '{path}' already exists and overwrite was not confirmed")]
    OutputExists { path: String },
    #[error("Cannot create output directory '{path}': {message}")]
    PathUnwritable { path: String, message: String },
    #[error("Another invocation is still in progress")]
    InvocationInProgress,
}

impl ValidationError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::UnknownColorspace { .. } => "unknown_colorspace",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::InvalidShaperSize(_) => "invalid_shaper_size",
            Self::OutputExists { .. } => "output_exists",
            Self::PathUnwritable { .. } => "path_unwritable",
            Self::InvocationInProgress => "invocation_in_progress",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrepareWarning {
    /// No catalog names were available, so colorspace fields went unchecked.
    EmptyCatalog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCommand {
    pub id: Uuid,
    pub tool: ToolKind,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub output_path: Option<PathBuf>,
    pub target: String,
    pub warnings: Vec<PrepareWarning>,
}

impl PreparedCommand {
    pub fn has_warning(&self, warning: PrepareWarning) -> bool {
        self.warnings.contains(&warning)
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolInvoker {
    tools: ToolTable,
    output_root: Option<PathBuf>,
}

impl ToolInvoker {
    pub fn new(tools: ToolTable) -> Self {
        Self {
            tools,
            output_root: None,
        }
    }

    pub fn with_output_root(mut self, output_root: impl Into<PathBuf>) -> Self {
        self.output_root = Some(output_root.into());
        self
    }

    pub fn tools(&self) -> &ToolTable {
        &self.tools
    }

    pub fn prepare(
        &self,
        request: &ToolRequest,
        catalog: &ColorspaceCatalog,
    ) -> Result<PreparedCommand, ValidationError> {
        let tool = request.tool();
        for field in tool.required_fields() {
            if request.present_field(*field).is_none() {
                return Err(ValidationError::MissingField { field: *field });
            }
        }

        let mut values = BTreeMap::new();
        let mut warnings = Vec::new();
        for field in ToolField::ALL {
            let Some(value) = request.present_field(field) else {
                continue;
            };
            let normalized = match field {
                ToolField::Format => parse_format(value)?.as_str().to_string(),
                ToolField::ShaperSize => parse_shaper_size(value)?.to_string(),
                _ => value.to_string(),
            };
            if field.is_colorspace() {
                check_colorspace(field, value, catalog, &mut warnings)?;
            }
            values.insert(field, normalized);
        }

        let output_path = self.resolve_output(request);
        if let Some(path) = output_path.as_deref() {
            check_overwrite(path, request.overwrite())?;
            values.insert(ToolField::Output, path.to_string_lossy().to_string());
        }

        let target = self.target_name(request);
        let spec = self.tools.get(tool);
        let prepared = PreparedCommand {
            id: Uuid::new_v4(),
            tool,
            program: resolve_program(spec.program.as_str()),
            args: spec.args.render(&values),
            output_path,
            target,
            warnings,
        };

        // Only side effect, after every check has passed.
        if let Some(path) = prepared.output_path.as_deref() {
            ensure_parent_dir(path)?;
        }

        debug!(
            invocation_id = %prepared.id,
            tool = %tool,
            command = %prepared.command_line(),
            "prepared tool command"
        );
        Ok(prepared)
    }

    /// Where the request's output lands: joined onto the output root when
    /// relative, with the format extension appended. `None` without an output.
    pub fn resolve_output(&self, request: &ToolRequest) -> Option<PathBuf> {
        let output = request.present_field(ToolField::Output)?;
        let raw = PathBuf::from(output);
        let path = match self.output_root.as_deref() {
            Some(root) if raw.is_relative() => root.join(raw),
            _ => raw,
        };
        let format = request
            .present_field(ToolField::Format)
            .and_then(|value| value.parse::<LutFormat>().ok());
        Some(match format {
            Some(format) => with_format_extension(path, format),
            None => path,
        })
    }

    /// File name written to audit lines: the resolved output for bakes, the
    /// config otherwise. Prepared commands and rejections share it.
    pub fn target_name(&self, request: &ToolRequest) -> String {
        let path = match (request.tool(), self.resolve_output(request)) {
            (ToolKind::Bake, Some(path)) => path,
            _ => request
                .present_field(ToolField::Config)
                .map(PathBuf::from)
                .unwrap_or_default(),
        };
        path.file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string())
    }
}

fn parse_format(value: &str) -> Result<LutFormat, ValidationError> {
    value
        .parse::<LutFormat>()
        .map_err(ValidationError::UnsupportedFormat)
}

fn parse_shaper_size(value: &str) -> Result<u32, ValidationError> {
    value
        .parse::<u32>()
        .ok()
        .filter(|size| *size > 0)
        .ok_or_else(|| ValidationError::InvalidShaperSize(value.to_string()))
}

fn check_colorspace(
    field: ToolField,
    name: &str,
    catalog: &ColorspaceCatalog,
    warnings: &mut Vec<PrepareWarning>,
) -> Result<(), ValidationError> {
    if catalog.is_empty() {
        if !warnings.contains(&PrepareWarning::EmptyCatalog) {
            warn!(field = %field, colorspace = name, "no colorspace catalog loaded; skipping membership check");
            warnings.push(PrepareWarning::EmptyCatalog);
        }
        return Ok(());
    }
    if catalog.contains(name) {
        Ok(())
    } else {
        Err(ValidationError::UnknownColorspace {
            field,
            name: name.to_string(),
        })
    }
}

pub fn with_format_extension(path: PathBuf, format: LutFormat) -> PathBuf {
    let suffix = format!(".{}", format.extension());
    let already = path
        .file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase().ends_with(suffix.as_str()))
        .unwrap_or(false);
    if already {
        return path;
    }
    let mut raw: OsString = path.into_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

fn check_overwrite(path: &Path, decision: OverwriteDecision) -> Result<(), ValidationError> {
    if path.exists() && decision != OverwriteDecision::Confirmed {
        return Err(ValidationError::OutputExists {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<(), ValidationError> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    if parent.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(parent).map_err(|error| ValidationError::PathUnwritable {
        path: parent.display().to_string(),
        message: error.to_string(),
    })
}
