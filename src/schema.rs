//! Static schema descriptors for every record the bridge emits.
//!
//! The descriptors are built once on first use and shared read-only between
//! all conversions. Field order inside a struct schema is part of the emitted
//! layout and never depends on the message being converted.

use std::fmt;
use std::sync::LazyLock;

/// Logical name marking an `int64` schema as milliseconds since the epoch.
pub const TIMESTAMP_LOGICAL_NAME: &str = "org.apache.kafka.connect.data.Timestamp";

pub const FIELD_ENVELOPE_DELIVERY_TAG: &str = "deliveryTag";
pub const FIELD_ENVELOPE_IS_REDELIVER: &str = "isRedeliver";
pub const FIELD_ENVELOPE_EXCHANGE: &str = "exchange";
pub const FIELD_ENVELOPE_ROUTING_KEY: &str = "routingKey";

pub const FIELD_HEADER_VALUE_TYPE: &str = "type";

pub const FIELD_PROPERTIES_CONTENT_TYPE: &str = "contentType";
pub const FIELD_PROPERTIES_CONTENT_ENCODING: &str = "contentEncoding";
pub const FIELD_PROPERTIES_HEADERS: &str = "headers";
pub const FIELD_PROPERTIES_DELIVERY_MODE: &str = "deliveryMode";
pub const FIELD_PROPERTIES_PRIORITY: &str = "priority";
pub const FIELD_PROPERTIES_CORRELATION_ID: &str = "correlationId";
pub const FIELD_PROPERTIES_REPLY_TO: &str = "replyTo";
pub const FIELD_PROPERTIES_EXPIRATION: &str = "expiration";
pub const FIELD_PROPERTIES_MESSAGE_ID: &str = "messageId";
pub const FIELD_PROPERTIES_TIMESTAMP: &str = "timestamp";
pub const FIELD_PROPERTIES_TYPE: &str = "type";
pub const FIELD_PROPERTIES_USER_ID: &str = "userId";
pub const FIELD_PROPERTIES_APP_ID: &str = "appId";

pub const FIELD_MESSAGE_CONSUMER_TAG: &str = "consumerTag";
pub const FIELD_MESSAGE_ENVELOPE: &str = "envelope";
pub const FIELD_MESSAGE_BASIC_PROPERTIES: &str = "basicProperties";
pub const FIELD_MESSAGE_BODY: &str = "body";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Boolean,
    String,
    Bytes,
    Array,
    Map,
    Struct,
}

impl SchemaType {
    pub fn name(self) -> &'static str {
        match self {
            SchemaType::Int8 => "int8",
            SchemaType::Int16 => "int16",
            SchemaType::Int32 => "int32",
            SchemaType::Int64 => "int64",
            SchemaType::Float32 => "float32",
            SchemaType::Float64 => "float64",
            SchemaType::Boolean => "boolean",
            SchemaType::String => "string",
            SchemaType::Bytes => "bytes",
            SchemaType::Array => "array",
            SchemaType::Map => "map",
            SchemaType::Struct => "struct",
        }
    }

    pub fn is_primitive(self) -> bool {
        !matches!(self, SchemaType::Array | SchemaType::Map | SchemaType::Struct)
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One arm of the header value union.
///
/// This list is maintained by hand. Adding an arm means adding a variant here,
/// to [`HeaderType::ALL`], and to `HeaderValue`; every `match` on either type
/// is exhaustive so the compiler points at each site that needs updating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderType {
    String,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Boolean,
    Timestamp,
}

impl HeaderType {
    pub const ALL: [HeaderType; 9] = [
        HeaderType::String,
        HeaderType::Int8,
        HeaderType::Int16,
        HeaderType::Int32,
        HeaderType::Int64,
        HeaderType::Float32,
        HeaderType::Float64,
        HeaderType::Boolean,
        HeaderType::Timestamp,
    ];

    /// Discriminator string, which is also the name of the arm's field.
    pub fn tag(self) -> &'static str {
        match self {
            HeaderType::String => "string",
            HeaderType::Int8 => "int8",
            HeaderType::Int16 => "int16",
            HeaderType::Int32 => "int32",
            HeaderType::Int64 => "int64",
            HeaderType::Float32 => "float32",
            HeaderType::Float64 => "float64",
            HeaderType::Boolean => "boolean",
            HeaderType::Timestamp => "timestamp",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// Schema of the arm's storage field. Always optional.
    pub fn schema(self) -> Schema {
        let doc = match self {
            HeaderType::String => "Storage for when the `type` field is set to `string`. Null otherwise.",
            HeaderType::Int8 => "Storage for when the `type` field is set to `int8`. Null otherwise.",
            HeaderType::Int16 => "Storage for when the `type` field is set to `int16`. Null otherwise.",
            HeaderType::Int32 => "Storage for when the `type` field is set to `int32`. Null otherwise.",
            HeaderType::Int64 => "Storage for when the `type` field is set to `int64`. Null otherwise.",
            HeaderType::Float32 => "Storage for when the `type` field is set to `float32`. Null otherwise.",
            HeaderType::Float64 => "Storage for when the `type` field is set to `float64`. Null otherwise.",
            HeaderType::Boolean => "Storage for when the `type` field is set to `boolean`. Null otherwise.",
            HeaderType::Timestamp => "Storage for when the `type` field is set to `timestamp`. Null otherwise.",
        };
        let schema = match self {
            HeaderType::String => Schema::primitive(SchemaType::String),
            HeaderType::Int8 => Schema::primitive(SchemaType::Int8),
            HeaderType::Int16 => Schema::primitive(SchemaType::Int16),
            HeaderType::Int32 => Schema::primitive(SchemaType::Int32),
            HeaderType::Int64 => Schema::primitive(SchemaType::Int64),
            HeaderType::Float32 => Schema::primitive(SchemaType::Float32),
            HeaderType::Float64 => Schema::primitive(SchemaType::Float64),
            HeaderType::Boolean => Schema::primitive(SchemaType::Boolean),
            HeaderType::Timestamp => Schema::timestamp(),
        };
        schema.optional().doc(doc)
    }
}

impl fmt::Display for HeaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub index: usize,
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub schema_type: SchemaType,
    pub name: Option<&'static str>,
    pub version: Option<i32>,
    pub doc: Option<&'static str>,
    pub optional: bool,
    fields: Vec<Field>,
    key_schema: Option<Box<Schema>>,
    value_schema: Option<Box<Schema>>,
}

impl Schema {
    pub fn primitive(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            name: None,
            version: None,
            doc: None,
            optional: false,
            fields: Vec::new(),
            key_schema: None,
            value_schema: None,
        }
    }

    pub fn timestamp() -> Self {
        Self::primitive(SchemaType::Int64)
            .named(TIMESTAMP_LOGICAL_NAME)
            .version(1)
    }

    pub fn structure(name: &'static str) -> Self {
        Self::primitive(SchemaType::Struct).named(name)
    }

    pub fn map(key: Schema, value: Schema) -> Self {
        Self {
            key_schema: Some(Box::new(key)),
            value_schema: Some(Box::new(value)),
            ..Self::primitive(SchemaType::Map)
        }
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn version(mut self, version: i32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn doc(mut self, doc: &'static str) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Append a field to a struct schema. Field indexes follow insertion order.
    pub fn with_field(mut self, name: &'static str, schema: Schema) -> Self {
        debug_assert_eq!(self.schema_type, SchemaType::Struct);
        debug_assert!(self.field(name).is_none(), "duplicate field {name}");
        let index = self.fields.len();
        self.fields.push(Field {
            name,
            index,
            schema,
        });
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn key_schema(&self) -> Option<&Schema> {
        self.key_schema.as_deref()
    }

    pub fn value_schema(&self) -> Option<&Schema> {
        self.value_schema.as_deref()
    }

    pub fn is_timestamp(&self) -> bool {
        self.name == Some(TIMESTAMP_LOGICAL_NAME)
    }
}

fn optional_string(doc: &'static str) -> Schema {
    Schema::primitive(SchemaType::String).optional().doc(doc)
}

fn optional_int32(doc: &'static str) -> Schema {
    Schema::primitive(SchemaType::Int32).optional().doc(doc)
}

pub static ENVELOPE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::structure("amqp_topic_bridge.Envelope")
        .version(1)
        .doc("Routing metadata the broker attached to a delivery.")
        .with_field(
            FIELD_ENVELOPE_DELIVERY_TAG,
            Schema::primitive(SchemaType::Int64)
                .doc("Channel-scoped, monotonically increasing delivery tag."),
        )
        .with_field(
            FIELD_ENVELOPE_IS_REDELIVER,
            Schema::primitive(SchemaType::Boolean)
                .doc("Set when the broker has delivered this message before."),
        )
        .with_field(
            FIELD_ENVELOPE_EXCHANGE,
            optional_string("Exchange the message was published to."),
        )
        .with_field(
            FIELD_ENVELOPE_ROUTING_KEY,
            optional_string("Routing key the message was published with."),
        )
});

pub static HEADER_VALUE: LazyLock<Schema> = LazyLock::new(|| {
    let schema = Schema::structure("amqp_topic_bridge.BasicProperties.HeaderValue")
        .version(1)
        .doc(
            "Value of a single message header. The `type` field names the one \
             populated field; every other storage field is null.",
        )
        .with_field(
            FIELD_HEADER_VALUE_TYPE,
            Schema::primitive(SchemaType::String)
                .doc("Discriminator naming the field that holds the header's value."),
        );
    HeaderType::ALL
        .into_iter()
        .fold(schema, |schema, arm| schema.with_field(arm.tag(), arm.schema()))
});

pub static BASIC_PROPERTIES: LazyLock<Schema> = LazyLock::new(|| {
    Schema::structure("amqp_topic_bridge.BasicProperties")
        .version(1)
        .optional()
        .doc("Protocol-level properties sent with the message.")
        .with_field(
            FIELD_PROPERTIES_CONTENT_TYPE,
            optional_string("MIME content type of the body."),
        )
        .with_field(
            FIELD_PROPERTIES_CONTENT_ENCODING,
            optional_string("MIME content encoding of the body."),
        )
        .with_field(
            FIELD_PROPERTIES_HEADERS,
            Schema::map(
                Schema::primitive(SchemaType::String),
                HEADER_VALUE.clone(),
            )
            .doc("Application headers keyed by header name."),
        )
        .with_field(
            FIELD_PROPERTIES_DELIVERY_MODE,
            optional_int32("1 for transient, 2 for persistent."),
        )
        .with_field(FIELD_PROPERTIES_PRIORITY, optional_int32("Message priority."))
        .with_field(
            FIELD_PROPERTIES_CORRELATION_ID,
            optional_string("Application correlation identifier."),
        )
        .with_field(FIELD_PROPERTIES_REPLY_TO, optional_string("Address to reply to."))
        .with_field(
            FIELD_PROPERTIES_EXPIRATION,
            optional_string("Per-message TTL as sent by the publisher."),
        )
        .with_field(
            FIELD_PROPERTIES_MESSAGE_ID,
            optional_string("Application message identifier."),
        )
        .with_field(
            FIELD_PROPERTIES_TIMESTAMP,
            Schema::timestamp().optional().doc("Publisher-supplied timestamp."),
        )
        .with_field(FIELD_PROPERTIES_TYPE, optional_string("Message type name."))
        .with_field(FIELD_PROPERTIES_USER_ID, optional_string("Creating user id."))
        .with_field(FIELD_PROPERTIES_APP_ID, optional_string("Creating application id."))
});

pub static KEY: LazyLock<Schema> = LazyLock::new(|| {
    Schema::structure("amqp_topic_bridge.MessageKey")
        .version(1)
        .doc("Key used for partition assignment on the destination topic.")
        .with_field(
            FIELD_PROPERTIES_MESSAGE_ID,
            optional_string("The messageId property of the delivery."),
        )
});

pub static VALUE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::structure("amqp_topic_bridge.Message")
        .version(1)
        .doc("A delivery as handed to the consumer.")
        .with_field(
            FIELD_MESSAGE_CONSUMER_TAG,
            Schema::primitive(SchemaType::String).doc("Tag of the consuming subscription."),
        )
        .with_field(FIELD_MESSAGE_ENVELOPE, ENVELOPE.clone())
        .with_field(FIELD_MESSAGE_BASIC_PROPERTIES, BASIC_PROPERTIES.clone())
        .with_field(
            FIELD_MESSAGE_BODY,
            Schema::primitive(SchemaType::String).doc("The message body decoded as text."),
        )
});

/// Schema of the emitted value when only the body is forwarded.
pub static BODY: LazyLock<Schema> = LazyLock::new(|| {
    Schema::primitive(SchemaType::String).doc("The message body decoded as text.")
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_value_has_discriminator_then_one_field_per_arm() {
        let names: Vec<_> = HEADER_VALUE.fields().iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            vec![
                "type", "string", "int8", "int16", "int32", "int64", "float32", "float64",
                "boolean", "timestamp"
            ]
        );
        assert!(!HEADER_VALUE.field("type").unwrap().schema.optional);
        for arm in HeaderType::ALL {
            let field = HEADER_VALUE.field(arm.tag()).unwrap();
            assert!(field.schema.optional, "{arm} must be optional");
            assert!(field.schema.schema_type.is_primitive());
        }
    }

    #[test]
    fn header_value_excludes_composite_kinds() {
        for kind in [SchemaType::Array, SchemaType::Map, SchemaType::Struct] {
            assert!(HEADER_VALUE.field(kind.name()).is_none());
        }
    }

    #[test]
    fn timestamp_arm_is_logical_int64() {
        let ts = &HEADER_VALUE.field("timestamp").unwrap().schema;
        assert_eq!(ts.schema_type, SchemaType::Int64);
        assert!(ts.is_timestamp());
    }

    #[test]
    fn tags_round_trip() {
        for arm in HeaderType::ALL {
            assert_eq!(HeaderType::from_tag(arm.tag()), Some(arm));
        }
        assert_eq!(HeaderType::from_tag("bytes"), None);
    }

    #[test]
    fn field_indexes_follow_declaration_order() {
        for (i, field) in BASIC_PROPERTIES.fields().iter().enumerate() {
            assert_eq!(field.index, i);
        }
        assert_eq!(BASIC_PROPERTIES.field("appId").unwrap().index, 12);
    }

    #[test]
    fn headers_field_maps_strings_to_header_values() {
        let headers = &BASIC_PROPERTIES.field(FIELD_PROPERTIES_HEADERS).unwrap().schema;
        assert_eq!(headers.schema_type, SchemaType::Map);
        assert_eq!(
            headers.key_schema().unwrap().schema_type,
            SchemaType::String
        );
        assert_eq!(headers.value_schema().unwrap(), &*HEADER_VALUE);
    }

    #[test]
    fn key_holds_only_message_id() {
        assert_eq!(KEY.fields().len(), 1);
        assert!(KEY.field("messageId").unwrap().schema.optional);
    }

    #[test]
    fn value_nests_envelope_and_properties() {
        let names: Vec<_> = VALUE.fields().iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["consumerTag", "envelope", "basicProperties", "body"]);
        assert!(VALUE.field("basicProperties").unwrap().schema.optional);
        assert!(!VALUE.field("envelope").unwrap().schema.optional);
        assert_eq!(BODY.schema_type, SchemaType::String);
    }
}
