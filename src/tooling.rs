pub mod execute;
pub mod prepare;
pub mod request;
pub mod resolve;
pub mod template;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

pub use execute::{CancelHandle, ExitStatus, InvocationHandle, InvocationOutcome};
pub use prepare::{PrepareWarning, PreparedCommand, ToolInvoker, ValidationError};
pub use request::{BakeParams, OverwriteDecision, ToolRequest};
pub use template::{ArgTemplate, ToolSpec, ToolTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Validate,
    Bake,
}

impl ToolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Bake => "bake",
        }
    }

    pub fn default_program(self) -> &'static str {
        match self {
            Self::Validate => "ociocheck",
            Self::Bake => "ociobakelut",
        }
    }

    pub fn required_fields(self) -> &'static [ToolField] {
        match self {
            Self::Validate => &[ToolField::Config],
            Self::Bake => &[
                ToolField::Config,
                ToolField::InputSpace,
                ToolField::OutputSpace,
                ToolField::Format,
                ToolField::Output,
            ],
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolField {
    Config,
    InputSpace,
    OutputSpace,
    Format,
    ShaperSize,
    Output,
}

impl ToolField {
    pub const ALL: [Self; 6] = [
        Self::Config,
        Self::InputSpace,
        Self::OutputSpace,
        Self::Format,
        Self::ShaperSize,
        Self::Output,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::InputSpace => "input_space",
            Self::OutputSpace => "output_space",
            Self::Format => "format",
            Self::ShaperSize => "shaper_size",
            Self::Output => "output",
        }
    }

    pub fn from_placeholder(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == name)
    }

    pub fn is_colorspace(self) -> bool {
        matches!(self, Self::InputSpace | Self::OutputSpace)
    }
}

impl fmt::Display for ToolField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LutFormat {
    Flame,
    #[serde(rename = "3dl")]
    ThreeDl,
    Cube,
    Spi1d,
    Csp,
    Houdini,
}

impl LutFormat {
    pub const ALL: [Self; 6] = [
        Self::Flame,
        Self::ThreeDl,
        Self::Cube,
        Self::Spi1d,
        Self::Csp,
        Self::Houdini,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flame => "flame",
            Self::ThreeDl => "3dl",
            Self::Cube => "cube",
            Self::Spi1d => "spi1d",
            Self::Csp => "csp",
            Self::Houdini => "houdini",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }
}

impl FromStr for LutFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == normalized)
            .ok_or_else(|| value.trim().to_string())
    }
}

impl fmt::Display for LutFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
