//! Converts AMQP header tables into tagged header values.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use lapin::types::{AMQPValue, FieldTable};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use tracing::trace;

use crate::delivery::amqp_timestamp;
use crate::error::{ConvertError, Result};
use crate::schema::{FIELD_HEADER_VALUE_TYPE, HeaderType};

/// A header value reduced to one of the supported scalar arms.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    String(String),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl HeaderValue {
    pub fn header_type(&self) -> HeaderType {
        match self {
            HeaderValue::String(_) => HeaderType::String,
            HeaderValue::Int8(_) => HeaderType::Int8,
            HeaderValue::Int16(_) => HeaderType::Int16,
            HeaderValue::Int32(_) => HeaderType::Int32,
            HeaderValue::Int64(_) => HeaderType::Int64,
            HeaderValue::Float32(_) => HeaderType::Float32,
            HeaderValue::Float64(_) => HeaderType::Float64,
            HeaderValue::Boolean(_) => HeaderType::Boolean,
            HeaderValue::Timestamp(_) => HeaderType::Timestamp,
        }
    }

    /// The discriminator written to the `type` field.
    pub fn tag(&self) -> &'static str {
        self.header_type().tag()
    }

    /// Serialize only the populated arm's value.
    fn serialize_arm<S: SerializeStruct>(&self, state: &mut S) -> std::result::Result<(), S::Error> {
        let field = self.tag();
        match self {
            HeaderValue::String(v) => state.serialize_field(field, v),
            HeaderValue::Int8(v) => state.serialize_field(field, v),
            HeaderValue::Int16(v) => state.serialize_field(field, v),
            HeaderValue::Int32(v) => state.serialize_field(field, v),
            HeaderValue::Int64(v) => state.serialize_field(field, v),
            HeaderValue::Float32(v) => state.serialize_field(field, v),
            HeaderValue::Float64(v) => state.serialize_field(field, v),
            HeaderValue::Boolean(v) => state.serialize_field(field, v),
            HeaderValue::Timestamp(v) => state.serialize_field(field, &v.timestamp_millis()),
        }
    }
}

/// Every storage field is written, in schema order, so that the layout is the
/// same for every header. Only the arm named by `type` is non-null.
/// Formats the populated arm at its own width; timestamps as epoch millis.
impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::String(v) => f.write_str(v),
            HeaderValue::Int8(v) => write!(f, "{v}"),
            HeaderValue::Int16(v) => write!(f, "{v}"),
            HeaderValue::Int32(v) => write!(f, "{v}"),
            HeaderValue::Int64(v) => write!(f, "{v}"),
            HeaderValue::Float32(v) => write!(f, "{v}"),
            HeaderValue::Float64(v) => write!(f, "{v}"),
            HeaderValue::Boolean(v) => write!(f, "{v}"),
            HeaderValue::Timestamp(v) => write!(f, "{}", v.timestamp_millis()),
        }
    }
}

impl Serialize for HeaderValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let populated = self.header_type();
        let mut state = serializer.serialize_struct("HeaderValue", HeaderType::ALL.len() + 1)?;
        state.serialize_field(FIELD_HEADER_VALUE_TYPE, self.tag())?;
        for arm in HeaderType::ALL {
            if arm == populated {
                self.serialize_arm(&mut state)?;
            } else {
                state.serialize_field(arm.tag(), &Option::<()>::None)?;
            }
        }
        state.end()
    }
}

/// Name of an AMQP field value's wire type, for diagnostics.
pub fn amqp_type_name(value: &AMQPValue) -> &'static str {
    match value {
        AMQPValue::Boolean(_) => "boolean",
        AMQPValue::ShortShortInt(_) => "short-short-int",
        AMQPValue::ShortShortUInt(_) => "short-short-uint",
        AMQPValue::ShortInt(_) => "short-int",
        AMQPValue::ShortUInt(_) => "short-uint",
        AMQPValue::LongInt(_) => "long-int",
        AMQPValue::LongUInt(_) => "long-uint",
        AMQPValue::LongLongInt(_) => "long-long-int",
        AMQPValue::Float(_) => "float",
        AMQPValue::Double(_) => "double",
        AMQPValue::DecimalValue(_) => "decimal",
        AMQPValue::ShortString(_) => "short-string",
        AMQPValue::LongString(_) => "long-string",
        AMQPValue::FieldArray(_) => "field-array",
        AMQPValue::Timestamp(_) => "timestamp",
        AMQPValue::FieldTable(_) => "field-table",
        AMQPValue::ByteArray(_) => "byte-array",
        AMQPValue::Void => "void",
    }
}

/// Tag a single header value.
///
/// Long strings are decoded to text before tagging. Unsigned integers are
/// widened to the next signed arm that holds every value of the type.
pub fn tag_value(name: &str, value: &AMQPValue) -> Result<HeaderValue> {
    let tagged = match value {
        AMQPValue::ShortString(s) => HeaderValue::String(s.as_str().to_owned()),
        AMQPValue::LongString(s) => {
            HeaderValue::String(String::from_utf8_lossy(s.as_bytes()).into_owned())
        }
        AMQPValue::ShortShortInt(v) => HeaderValue::Int8(*v),
        AMQPValue::ShortShortUInt(v) => HeaderValue::Int16(i16::from(*v)),
        AMQPValue::ShortInt(v) => HeaderValue::Int16(*v),
        AMQPValue::ShortUInt(v) => HeaderValue::Int32(i32::from(*v)),
        AMQPValue::LongInt(v) => HeaderValue::Int32(*v),
        AMQPValue::LongUInt(v) => HeaderValue::Int64(i64::from(*v)),
        AMQPValue::LongLongInt(v) => HeaderValue::Int64(*v),
        AMQPValue::Float(v) => HeaderValue::Float32(*v),
        AMQPValue::Double(v) => HeaderValue::Float64(*v),
        AMQPValue::Boolean(v) => HeaderValue::Boolean(*v),
        AMQPValue::Timestamp(seconds) => match amqp_timestamp(*seconds) {
            Some(ts) => HeaderValue::Timestamp(ts),
            None => {
                return Err(ConvertError::InvalidHeaderTimestamp {
                    header: name.to_owned(),
                    seconds: *seconds,
                });
            }
        },
        other => {
            return Err(ConvertError::UnsupportedHeaderType {
                header: name.to_owned(),
                found: amqp_type_name(other),
            });
        }
    };
    Ok(tagged)
}

/// Tag every header of a delivery, keeping the table's iteration order.
///
/// A single unsupported value fails the whole table.
pub fn tag_headers(headers: Option<&FieldTable>) -> Result<IndexMap<String, HeaderValue>> {
    let Some(headers) = headers else {
        return Ok(IndexMap::new());
    };

    let mut results = IndexMap::with_capacity(headers.inner().len());
    for (name, value) in headers.inner() {
        trace!(header = name.as_str(), value = ?value, "Tagging header");
        let tagged = tag_value(name.as_str(), value)?;
        trace!(header = name.as_str(), field = tagged.tag(), "Stored header value");
        results.insert(name.as_str().to_owned(), tagged);
    }
    Ok(results)
}
