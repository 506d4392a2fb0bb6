use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::report::audit_log::DEFAULT_AUDIT_LOG_FILE;
use crate::tooling::request::DEFAULT_TIMEOUT;
use crate::tooling::template::{ArgTemplate, ToolSpec, ToolTable};
use crate::tooling::ToolKind;

pub const DEFAULT_SETTINGS_FILE: &str = "ocio_toolkit.toml";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("failed to read toolkit settings '{path}': {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse toolkit settings TOML '{path}': {message}")]
    ParseToml { path: String, message: String },
    #[error("invalid argument template for '{tool}': {message}")]
    InvalidTemplate { tool: ToolKind, message: String },
    #[error("setting '{field}' has invalid value '{value}'")]
    InvalidValue { field: String, value: String },
}

/// One layer of settings. Layers merge field by field, later layers winning.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SettingsOverlay {
    pub validate_program: Option<String>,
    pub bake_program: Option<String>,
    pub validate_args: Option<Vec<Vec<String>>>,
    pub bake_args: Option<Vec<Vec<String>>>,
    pub default_config: Option<String>,
    pub lut_location: Option<String>,
    pub audit_log: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolkitSettings {
    pub tools: ToolTable,
    pub default_config: Option<PathBuf>,
    pub lut_location: Option<PathBuf>,
    pub audit_log: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for ToolkitSettings {
    fn default() -> Self {
        Self {
            tools: ToolTable::default(),
            default_config: None,
            lut_location: None,
            audit_log: Some(PathBuf::from(DEFAULT_AUDIT_LOG_FILE)),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    audit_log: Option<String>,
    timeout_secs: Option<u64>,
    default_config: Option<String>,
    lut_location: Option<String>,
    #[serde(default)]
    tools: ToolsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolsSection {
    validate: Option<ToolSection>,
    bake: Option<ToolSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolSection {
    program: Option<String>,
    args: Option<Vec<Vec<String>>>,
}

impl ToolkitSettings {
    /// Loads defaults < settings file < environment < `cli`.
    ///
    /// An explicit settings path must exist; the implicit `ocio_toolkit.toml` in
    /// `base_dir` is optional.
    pub fn load(
        base_dir: &Path,
        explicit_path: Option<&Path>,
        cli: &SettingsOverlay,
    ) -> Result<Self, SettingsError> {
        let file = load_settings_overlay(base_dir, explicit_path)?;
        let env_layer = env_overlay_from(|key| env::var(key).ok())?;
        Self::from_overlay(&merge_settings_overlays(&[&file, &env_layer, cli]))
    }

    pub fn from_overlay(overlay: &SettingsOverlay) -> Result<Self, SettingsError> {
        let defaults = Self::default();
        let tools = ToolTable {
            validate: tool_spec(
                ToolKind::Validate,
                overlay.validate_program.as_deref(),
                overlay.validate_args.clone(),
            )?,
            bake: tool_spec(
                ToolKind::Bake,
                overlay.bake_program.as_deref(),
                overlay.bake_args.clone(),
            )?,
        };
        let audit_log = match overlay.audit_log.as_deref().map(str::trim) {
            None => defaults.audit_log,
            Some("") => None,
            Some(path) => Some(PathBuf::from(path)),
        };
        Ok(Self {
            tools,
            default_config: non_blank(overlay.default_config.as_deref()).map(PathBuf::from),
            lut_location: non_blank(overlay.lut_location.as_deref()).map(PathBuf::from),
            audit_log,
            timeout: overlay
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        })
    }
}

pub fn load_settings_overlay(
    base_dir: &Path,
    explicit_path: Option<&Path>,
) -> Result<SettingsOverlay, SettingsError> {
    let path = match explicit_path {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => base_dir.join(path),
        None => {
            let implicit = base_dir.join(DEFAULT_SETTINGS_FILE);
            if !implicit.exists() {
                return Ok(SettingsOverlay::default());
            }
            implicit
        }
    };
    let raw = fs::read_to_string(path.as_path()).map_err(|error| SettingsError::ReadFile {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;
    parse_settings_overlay_toml(raw.as_str()).map_err(|message| SettingsError::ParseToml {
        path: path.display().to_string(),
        message,
    })
}

pub fn parse_settings_overlay_toml(raw: &str) -> Result<SettingsOverlay, String> {
    let parsed = toml::from_str::<SettingsFile>(raw).map_err(|e| e.to_string())?;
    let ToolsSection { validate, bake } = parsed.tools;
    let validate = validate.unwrap_or_default();
    let bake = bake.unwrap_or_default();
    Ok(SettingsOverlay {
        validate_program: validate.program,
        bake_program: bake.program,
        validate_args: validate.args,
        bake_args: bake.args,
        default_config: parsed.default_config,
        lut_location: parsed.lut_location,
        audit_log: parsed.audit_log,
        timeout_secs: parsed.timeout_secs,
    })
}

pub fn env_overlay_from<F>(lookup: F) -> Result<SettingsOverlay, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    let timeout_secs = match lookup("OCIO_TOOLKIT_TIMEOUT_SECS") {
        Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
            SettingsError::InvalidValue {
                field: String::from("OCIO_TOOLKIT_TIMEOUT_SECS"),
                value: raw.clone(),
            }
        })?),
        None => None,
    };
    Ok(SettingsOverlay {
        validate_program: lookup("OCIOCHECK_BIN").filter(|v| !v.trim().is_empty()),
        bake_program: lookup("OCIOBAKELUT_BIN").filter(|v| !v.trim().is_empty()),
        validate_args: None,
        bake_args: None,
        default_config: lookup("OCIO")
            .filter(|v| !v.trim().is_empty())
            .or_else(|| lookup("OCIO_CONFIG_PATH").filter(|v| !v.trim().is_empty())),
        lut_location: lookup("LUT_LOCATION").filter(|v| !v.trim().is_empty()),
        audit_log: lookup("OCIO_TOOLKIT_AUDIT_LOG"),
        timeout_secs,
    })
}

pub fn merge_settings_overlays(layers: &[&SettingsOverlay]) -> SettingsOverlay {
    layers
        .iter()
        .fold(SettingsOverlay::default(), |acc, layer| SettingsOverlay {
            validate_program: layer.validate_program.clone().or(acc.validate_program),
            bake_program: layer.bake_program.clone().or(acc.bake_program),
            validate_args: layer.validate_args.clone().or(acc.validate_args),
            bake_args: layer.bake_args.clone().or(acc.bake_args),
            default_config: layer.default_config.clone().or(acc.default_config),
            lut_location: layer.lut_location.clone().or(acc.lut_location),
            audit_log: layer.audit_log.clone().or(acc.audit_log),
            timeout_secs: layer.timeout_secs.or(acc.timeout_secs),
        })
}

fn tool_spec(
    tool: ToolKind,
    program: Option<&str>,
    args: Option<Vec<Vec<String>>>,
) -> Result<ToolSpec, SettingsError> {
    let mut spec = ToolSpec::default_for(tool);
    if let Some(program) = non_blank(program) {
        spec.program = program.to_string();
    }
    if let Some(groups) = args {
        spec.args = ArgTemplate::new(groups).map_err(|e| SettingsError::InvalidTemplate {
            tool,
            message: e.to_string(),
        })?;
        let mentioned = spec.args.fields();
        for field in tool.required_fields() {
            if !mentioned.contains(field) {
                warn!(tool = %tool, field = %field, "argument template never passes a required field");
            }
        }
    }
    Ok(spec)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
