//! Destination topic names computed from a template over the value record.
//!
//! A template is literal text with `${path}` placeholders. A path is a
//! dot-separated walk through the value schema, for example `body`,
//! `envelope.routingKey` or `basicProperties.headers.tenant`. Map fields take
//! the next segment as the key.
//!
//! Segments are split on every `.`, so a header whose name contains a dot
//! cannot be referenced from a template.

use std::fmt;

use serde_json::Value as Json;

use crate::error::TemplateError;
use crate::message::Message;
use crate::schema::{self, Schema, SchemaType};

const MAX_TOPIC_LENGTH: usize = 249;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl TopicTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let syntax = |reason: &str| TemplateError::Syntax {
            template: template.to_owned(),
            reason: reason.to_owned(),
        };

        let mut segments = Vec::new();
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_owned()));
            }
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| syntax("unterminated placeholder"))?;
            let path = after[..end].trim();
            if path.is_empty() {
                return Err(syntax("empty placeholder"));
            }
            let parts: Vec<String> = path.split('.').map(str::to_owned).collect();
            if parts.iter().any(String::is_empty) {
                return Err(syntax("empty path segment"));
            }
            segments.push(Segment::Field(parts));
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_owned()));
        }
        if segments.is_empty() {
            return Err(syntax("template is empty"));
        }

        Ok(Self {
            source: template.to_owned(),
            segments,
        })
    }

    /// Parse and check every placeholder against the value schema.
    pub fn parse_checked(template: &str) -> Result<Self, TemplateError> {
        let parsed = Self::parse(template)?;
        parsed.validate(&schema::VALUE)?;
        Ok(parsed)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Field paths referenced by the template, in order of appearance.
    pub fn fields(&self) -> impl Iterator<Item = String> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(path) => Some(path.join(".")),
            Segment::Literal(_) => None,
        })
    }

    pub fn validate(&self, schema: &Schema) -> Result<(), TemplateError> {
        for segment in &self.segments {
            if let Segment::Field(path) = segment {
                resolve_schema(schema, path)?;
            }
        }
        Ok(())
    }

    /// Render the topic name for one value record.
    pub fn render(&self, message: &Message) -> Result<String, TemplateError> {
        let root = if self.fields().next().is_some() {
            serde_json::to_value(message).map_err(|e| TemplateError::MissingValue {
                field: e.to_string(),
            })?
        } else {
            Json::Null
        };

        let mut topic = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => topic.push_str(text),
                Segment::Field(path) => {
                    let leaf = resolve_schema(&schema::VALUE, path)?;
                    topic.push_str(&render_field(message, &root, path, leaf)?);
                }
            }
        }
        validate_topic_name(&topic)?;
        Ok(topic)
    }
}

impl fmt::Display for TopicTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Walk `path` through `schema`, returning the schema of the referenced field.
fn resolve_schema<'a>(schema: &'a Schema, path: &[String]) -> Result<&'a Schema, TemplateError> {
    let unknown = || TemplateError::UnknownField {
        field: path.join("."),
    };

    let mut current = schema;
    for segment in path {
        current = match current.schema_type {
            SchemaType::Struct => &current.field(segment).ok_or_else(unknown)?.schema,
            SchemaType::Map => current.value_schema().ok_or_else(unknown)?,
            _ => return Err(unknown()),
        };
    }

    if current.schema_type.is_primitive() || is_header_value(current) {
        Ok(current)
    } else {
        Err(TemplateError::NotScalar {
            field: path.join("."),
        })
    }
}

fn is_header_value(schema: &Schema) -> bool {
    schema.name == schema::HEADER_VALUE.name
}

fn render_field(
    message: &Message,
    root: &Json,
    path: &[String],
    leaf: &Schema,
) -> Result<String, TemplateError> {
    let field = || path.join(".");
    let missing = || TemplateError::MissingValue { field: field() };

    // Headers are the only map values; the last segment names the header.
    if is_header_value(leaf) {
        return path
            .last()
            .and_then(|name| message.headers().get(name))
            .map(ToString::to_string)
            .ok_or_else(missing);
    }

    let mut current = root;
    for segment in path {
        current = current.get(segment.as_str()).ok_or_else(missing)?;
    }

    match current {
        Json::Null => Err(missing()),
        Json::String(s) => Ok(s.clone()),
        Json::Bool(b) => Ok(b.to_string()),
        Json::Number(n) => Ok(n.to_string()),
        Json::Array(_) | Json::Object(_) => Err(TemplateError::NotScalar { field: field() }),
    }
}

/// Destination topic names: 1 to 249 characters of `[A-Za-z0-9._-]`, and
/// neither `.` nor `..`.
pub fn validate_topic_name(topic: &str) -> Result<(), TemplateError> {
    let invalid = |reason| {
        Err(TemplateError::InvalidTopic {
            topic: topic.to_owned(),
            reason,
        })
    };
    if topic.is_empty() {
        return invalid("topic name is empty");
    }
    if topic == "." || topic == ".." {
        return invalid("topic name cannot be '.' or '..'");
    }
    if topic.len() > MAX_TOPIC_LENGTH {
        return invalid("topic name is longer than 249 characters");
    }
    if !topic
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
    {
        return invalid("topic name may only contain ASCII alphanumerics, '.', '_' and '-'");
    }
    Ok(())
}
