use std::collections::BTreeMap;

use thiserror::Error;

use crate::tooling::{ToolField, ToolKind};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("argument template references unknown placeholder '{{{0}}}'")]
    UnknownPlaceholder(String),
    #[error("argument template token '{0}' has an unterminated placeholder")]
    Unterminated(String),
    #[error("argument template group {0} is empty")]
    EmptyGroup(usize),
}

/// Ordered argument groups with `{field}` placeholders.
///
/// A group is emitted only when every placeholder it mentions has a value, so
/// optional flags and their values live in one group: `["--shapersize", "{shaper_size}"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgTemplate {
    groups: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Field(ToolField),
}

impl ArgTemplate {
    pub fn new(groups: Vec<Vec<String>>) -> Result<Self, TemplateError> {
        for (idx, group) in groups.iter().enumerate() {
            if group.is_empty() {
                return Err(TemplateError::EmptyGroup(idx));
            }
            for token in group {
                parse_token(token.as_str())?;
            }
        }
        Ok(Self { groups })
    }

    pub fn default_for(tool: ToolKind) -> Self {
        let groups: &[&[&str]] = match tool {
            ToolKind::Validate => &[&["--iconfig", "{config}"]],
            ToolKind::Bake => &[
                &["--iconfig", "{config}"],
                &["--inputspace", "{input_space}"],
                &["--outputspace", "{output_space}"],
                &["--format", "{format}"],
                &["--shapersize", "{shaper_size}"],
                &["{output}"],
            ],
        };
        Self {
            groups: groups
                .iter()
                .map(|group| group.iter().map(|token| token.to_string()).collect())
                .collect(),
        }
    }

    pub fn groups(&self) -> &[Vec<String>] {
        self.groups.as_slice()
    }

    pub fn fields(&self) -> Vec<ToolField> {
        let mut out = Vec::new();
        for token in self.groups.iter().flatten() {
            for segment in parse_token(token.as_str()).unwrap_or_default() {
                if let Segment::Field(field) = segment {
                    if !out.contains(&field) {
                        out.push(field);
                    }
                }
            }
        }
        out
    }

    pub fn render(&self, values: &BTreeMap<ToolField, String>) -> Vec<String> {
        let mut args = Vec::new();
        'groups: for group in &self.groups {
            let mut rendered = Vec::with_capacity(group.len());
            for token in group {
                let Ok(segments) = parse_token(token.as_str()) else {
                    continue 'groups;
                };
                let mut arg = String::new();
                for segment in segments {
                    match segment {
                        Segment::Literal(text) => arg.push_str(text),
                        Segment::Field(field) => match values.get(&field) {
                            Some(value) => arg.push_str(value.as_str()),
                            None => continue 'groups,
                        },
                    }
                }
                rendered.push(arg);
            }
            args.extend(rendered);
        }
        args
    }
}

fn parse_token(token: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = token;
    while let Some(open) = rest.find('{') {
        if open > 0 {
            segments.push(Segment::Literal(&rest[..open]));
        }
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| TemplateError::Unterminated(token.to_string()))?;
        let name = &after[..close];
        let field = ToolField::from_placeholder(name.trim())
            .ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))?;
        segments.push(Segment::Field(field));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    Ok(segments)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub program: String,
    pub args: ArgTemplate,
}

impl ToolSpec {
    pub fn default_for(tool: ToolKind) -> Self {
        Self {
            program: tool.default_program().to_string(),
            args: ArgTemplate::default_for(tool),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolTable {
    pub validate: ToolSpec,
    pub bake: ToolSpec,
}

impl ToolTable {
    pub fn get(&self, tool: ToolKind) -> &ToolSpec {
        match tool {
            ToolKind::Validate => &self.validate,
            ToolKind::Bake => &self.bake,
        }
    }

    pub fn with_program(mut self, tool: ToolKind, program: impl Into<String>) -> Self {
        match tool {
            ToolKind::Validate => self.validate.program = program.into(),
            ToolKind::Bake => self.bake.program = program.into(),
        }
        self
    }
}

impl Default for ToolTable {
    fn default() -> Self {
        Self {
            validate: ToolSpec::default_for(ToolKind::Validate),
            bake: ToolSpec::default_for(ToolKind::Bake),
        }
    }
}
