use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Errors raised while parsing, editing or rendering a workload template.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TemplateError {
    /// Template or rendered text is not valid YAML
    Parse { message: String },
    /// Parameter name never declared by the template
    UnknownParameter { name: String },
    /// Marker without a value at render time
    MissingParameter { name: String },
    /// Document has the wrong shape (for example a list instead of a mapping)
    InvalidDocument { message: String },
    /// Value that cannot be represented as a parameter string
    InvalidValue { name: String, message: String },
}

impl Display for TemplateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::Parse { message } => write!(f, "invalid YAML: {message}"),
            TemplateError::UnknownParameter { name } => write!(f, "unknown parameter: {name}"),
            TemplateError::MissingParameter { name } => {
                write!(f, "no value for parameter: {name}")
            }
            TemplateError::InvalidDocument { message } => {
                write!(f, "invalid document: {message}")
            }
            TemplateError::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for TemplateError {}

#[derive(Debug, Clone, Eq, PartialEq)]
struct Placeholder<'a> {
    start: usize,
    end: usize,
    name: &'a str,
    default: &'a str,
}

/// Finds every `${NAME:-DEFAULT}` in `text`, left to right and non-overlapping.
/// NAME excludes `:` and `}`, DEFAULT excludes `}`, and both must be non-empty.
fn placeholders(text: &str) -> Vec<Placeholder<'_>> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut index = 0;

    while index + 1 < bytes.len() {
        if bytes[index] == b'$' && bytes[index + 1] == b'{' {
            if let Some(placeholder) = placeholder_at(text, index) {
                index = placeholder.end;
                found.push(placeholder);
                continue;
            }
        }
        index += 1;
    }

    found
}

fn placeholder_at(text: &str, start: usize) -> Option<Placeholder<'_>> {
    let bytes = text.as_bytes();
    let name_start = start + 2;
    let name_len = bytes[name_start..]
        .iter()
        .position(|byte| *byte == b':' || *byte == b'}')?;
    if name_len == 0 {
        return None;
    }
    let name_end = name_start + name_len;
    if !text[name_end..].starts_with(":-") {
        return None;
    }

    let default_start = name_end + 2;
    let default_len = bytes[default_start..].iter().position(|byte| *byte == b'}')?;
    if default_len == 0 {
        return None;
    }
    let default_end = default_start + default_len;

    Some(Placeholder {
        start,
        end: default_end + 1,
        name: &text[name_start..name_end],
        default: &text[default_start..default_end],
    })
}

/// A parsed workload template: the raw text plus its YAML documents.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    documents: Vec<Value>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            source: source.to_string(),
            documents: parse_documents(source)?,
        })
    }

    /// Parameter defaults in document order. A name that recurs keeps the
    /// default of its first occurrence.
    pub fn extract_parameters(&self) -> ParameterSet {
        let mut params = ParameterSet::default();
        for document in &self.documents {
            collect_parameters(document, &mut params);
        }
        params
    }

    /// Rewrites every extracted placeholder into a bare marker so rendering
    /// depends only on the supplied values. Placeholders extraction never sees,
    /// such as those in comments or keys, stay literal text.
    pub fn normalize(&self) -> NormalizedTemplate {
        let declared = self.extract_parameters();
        let mut segments = Vec::new();
        let mut cursor = 0;
        for placeholder in placeholders(&self.source) {
            if !declared.values.contains_key(placeholder.name) {
                continue;
            }
            if placeholder.start > cursor {
                segments.push(Segment::Literal(
                    self.source[cursor..placeholder.start].to_string(),
                ));
            }
            segments.push(Segment::Marker(placeholder.name.to_string()));
            cursor = placeholder.end;
        }
        if cursor < self.source.len() {
            segments.push(Segment::Literal(self.source[cursor..].to_string()));
        }

        NormalizedTemplate { segments }
    }
}

fn collect_parameters(value: &Value, params: &mut ParameterSet) {
    match value {
        Value::String(text) => {
            for placeholder in placeholders(text) {
                params
                    .values
                    .entry(placeholder.name.to_string())
                    .or_insert_with(|| placeholder.default.to_string());
            }
        }
        Value::Sequence(items) => {
            for item in items {
                collect_parameters(item, params);
            }
        }
        Value::Mapping(mapping) => {
            for item in mapping.values() {
                collect_parameters(item, params);
            }
        }
        Value::Tagged(tagged) => collect_parameters(&tagged.value, params),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn parse_documents(text: &str) -> Result<Vec<Value>, TemplateError> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document).map_err(|error| TemplateError::Parse {
            message: error.to_string(),
        })?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Segment {
    Literal(String),
    Marker(String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NormalizedTemplate {
    segments: Vec<Segment>,
}

impl NormalizedTemplate {
    pub fn render(&self, params: &ParameterSet) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Marker(name) => {
                    let value = params
                        .get(name)
                        .ok_or_else(|| TemplateError::MissingParameter { name: name.clone() })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    /// Renders and re-parses the result; every document must be a mapping.
    pub fn materialize(&self, params: &ParameterSet) -> Result<Vec<Value>, TemplateError> {
        let rendered = self.render(params)?;
        let documents = parse_documents(&rendered)?;
        if documents.is_empty() {
            return Err(TemplateError::InvalidDocument {
                message: "template rendered no documents".to_string(),
            });
        }
        if let Some(position) = documents.iter().position(|doc| !doc.is_mapping()) {
            return Err(TemplateError::InvalidDocument {
                message: format!("document {} is not a mapping", position + 1),
            });
        }
        Ok(documents)
    }
}

impl Display for NormalizedTemplate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => f.write_str(text)?,
                Segment::Marker(name) => write!(f, "${{{name}}}")?,
            }
        }
        Ok(())
    }
}

/// Current parameter values keyed by name. Keys only ever come from a template.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    values: BTreeMap<String, String>,
}

impl ParameterSet {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<(), TemplateError> {
        let slot = self
            .values
            .get_mut(name)
            .ok_or_else(|| TemplateError::UnknownParameter {
                name: name.to_string(),
            })?;
        *slot = value.into();
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String, TemplateError> {
        serde_yaml::to_string(&self.values).map_err(|error| TemplateError::InvalidDocument {
            message: error.to_string(),
        })
    }

    /// Applies an edited YAML mapping. Nothing changes unless the whole document
    /// is accepted; keys left out keep their current value.
    pub fn apply_bulk_text(&mut self, text: &str) -> Result<(), TemplateError> {
        let parsed: Value = serde_yaml::from_str(text).map_err(|error| TemplateError::Parse {
            message: error.to_string(),
        })?;
        let mapping = match parsed {
            Value::Null => return Ok(()),
            Value::Mapping(mapping) => mapping,
            _ => {
                return Err(TemplateError::InvalidDocument {
                    message: "expected a mapping of parameter names to values".to_string(),
                });
            }
        };

        let mut updated = self.values.clone();
        for (key, value) in mapping {
            let Value::String(name) = key else {
                return Err(TemplateError::InvalidDocument {
                    message: "parameter names must be strings".to_string(),
                });
            };
            let Some(slot) = updated.get_mut(&name) else {
                return Err(TemplateError::UnknownParameter { name });
            };
            *slot = scalar_text(&name, value)?;
        }

        self.values = updated;
        Ok(())
    }

    /// Rebuilds a saved set against the template defaults. Returns the result
    /// and the saved keys the template no longer declares.
    pub fn reconcile(defaults: &ParameterSet, saved: ParameterSet) -> (ParameterSet, Vec<String>) {
        let mut values = defaults.values.clone();
        let mut dropped = Vec::new();
        for (name, value) in saved.values {
            match values.get_mut(&name) {
                Some(slot) => *slot = value,
                None => dropped.push(name),
            }
        }
        (ParameterSet { values }, dropped)
    }
}

fn scalar_text(name: &str, value: Value) -> Result<String, TemplateError> {
    match value {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Null => Ok(String::new()),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => {
            Err(TemplateError::InvalidValue {
                name: name.to_string(),
                message: "expected a scalar".to_string(),
            })
        }
    }
}

#[cfg(test)]
impl ParameterSet {
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            values: pairs
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        }
    }
}
