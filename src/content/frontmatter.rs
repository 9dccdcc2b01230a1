//! Front-matter parsing

use chrono::{DateTime, Local, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;

use crate::error::ErrorKind;

/// Front-matter failures, before they are tied to a content identity
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrontMatterError {
    #[error("block opened at line {line} is never closed")]
    Unclosed { line: usize },

    #[error("{message}")]
    Invalid { line: usize, message: String },
}

impl From<FrontMatterError> for ErrorKind {
    fn from(err: FrontMatterError) -> Self {
        let line = match &err {
            FrontMatterError::Unclosed { line } | FrontMatterError::Invalid { line, .. } => *line,
        };
        ErrorKind::MalformedFrontMatter {
            line,
            message: err.to_string(),
        }
    }
}

/// Metadata mapping decoded from a front-matter block.
///
/// Keys keep the case the author wrote; lookups through [`Metadata::get`]
/// prefer an exact match and fall back to an ASCII case-insensitive one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(IndexMap<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).or_else(|| {
            self.0
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    /// Get a value as a string slice, if it is a YAML string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Serialize back into a YAML document
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.0)
    }

    /// Tags as a list, accepting either a single string or a list of strings
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(scalar_to_string)
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Parse a date-like value
    pub fn date(&self, key: &str) -> Option<DateTime<Local>> {
        self.get(key)
            .and_then(scalar_to_string)
            .and_then(|s| parse_date_string(&s))
    }
}

/// Result of splitting a content file into metadata and body
#[derive(Debug, Clone, PartialEq)]
pub struct FrontMatter<'a> {
    pub metadata: Metadata,
    /// Remaining text after the closing fence
    pub body: &'a str,
    /// 1-based line number of the first body line in the original text
    pub body_line: usize,
}

impl<'a> FrontMatter<'a> {
    /// Parse front-matter from content string.
    ///
    /// YAML blocks are fenced by `---` (closed by `---` or `...`), JSON blocks
    /// by `;;;`. Text without an opening fence is returned untouched as body.
    pub fn parse(content: &'a str) -> Result<Self, FrontMatterError> {
        let text = content.strip_prefix('\u{feff}').unwrap_or(content);
        let first_line = text.lines().next().unwrap_or("").trim_end();

        match first_line {
            "---" => Self::parse_block(text, &["---", "..."], decode_yaml),
            ";;;" => Self::parse_block(text, &[";;;"], decode_json),
            _ => Ok(FrontMatter {
                metadata: Metadata::new(),
                body: content,
                body_line: 1,
            }),
        }
    }

    fn parse_block(
        text: &'a str,
        closers: &[&str],
        decode: fn(&str) -> Result<Metadata, (Option<usize>, String)>,
    ) -> Result<Self, FrontMatterError> {
        let mut lines = text.split_inclusive('\n');
        let opening = lines.next().unwrap_or("");
        let block_start = opening.len();
        let mut offset = block_start;

        for (index, line) in lines.enumerate() {
            // Opening fence is line 1, so this line is index + 2
            let line_no = index + 2;
            if closers.contains(&line.trim_end()) {
                let block = &text[block_start..offset];
                let body = &text[offset + line.len()..];
                let metadata = decode(block).map_err(|(line, message)| {
                    FrontMatterError::Invalid {
                        // Decoder lines are relative to the block, which starts at line 2
                        line: line.map(|l| l + 1).unwrap_or(1),
                        message,
                    }
                })?;
                return Ok(FrontMatter {
                    metadata,
                    body,
                    body_line: line_no + 1,
                });
            }
            offset += line.len();
        }

        Err(FrontMatterError::Unclosed { line: 1 })
    }
}

fn decode_yaml(block: &str) -> Result<Metadata, (Option<usize>, String)> {
    if block.trim().is_empty() {
        return Ok(Metadata::new());
    }

    let value: Value = serde_yaml::from_str(block)
        .map_err(|e| (e.location().map(|l| l.line()), format!("invalid YAML: {}", e)))?;

    match value {
        Value::Null => Ok(Metadata::new()),
        Value::Mapping(mapping) => {
            let mut metadata = IndexMap::with_capacity(mapping.len());
            for (key, value) in mapping {
                let key = scalar_to_string(&key)
                    .ok_or_else(|| (None, format!("unsupported metadata key: {:?}", key)))?;
                metadata.insert(key, value);
            }
            Ok(Metadata(metadata))
        }
        other => Err((
            None,
            format!("front matter must be a mapping, found {}", value_kind(&other)),
        )),
    }
}

fn decode_json(block: &str) -> Result<Metadata, (Option<usize>, String)> {
    if block.trim().is_empty() {
        return Ok(Metadata::new());
    }

    let value: serde_json::Value = serde_json::from_str(block)
        .map_err(|e| (Some(e.line()), format!("invalid JSON: {}", e)))?;

    if !value.is_object() {
        return Err((None, "front matter must be a JSON object".to_string()));
    }

    serde_json::from_value::<IndexMap<String, Value>>(value)
        .map(Metadata)
        .map_err(|e| (None, format!("invalid JSON: {}", e)))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Parse a date string in various formats
fn parse_date_string(s: &str) -> Option<DateTime<Local>> {
    let s = s.trim();

    let formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];

    for fmt in formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return dt.and_local_timezone(Local).earliest();
        }
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = chrono::NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0)?.and_local_timezone(Local).earliest();
        }
    }

    // RFC 3339 / ISO 8601 with offset
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Local))
}
