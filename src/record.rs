//! Turns one delivery into the record handed to the write path.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::delivery::{Envelope, PropertyBag};
use crate::error::{ConvertError, Result};
use crate::message::{self, Message, MessageKey};
use crate::schema::{self, Schema};
use crate::topic::TopicTemplate;

/// Source of the conversion-time timestamp.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that always reads the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

/// What the emitted record value contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueFormat {
    /// The body text alone, with a string schema.
    #[default]
    Body,
    /// The whole value record, with the message schema.
    Message,
}

impl FromStr for ValueFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "body" => Ok(ValueFormat::Body),
            "message" => Ok(ValueFormat::Message),
            other => Err(format!("unknown value format '{other}', expected 'body' or 'message'")),
        }
    }
}

impl fmt::Display for ValueFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueFormat::Body => f.write_str("body"),
            ValueFormat::Message => f.write_str("message"),
        }
    }
}

/// Where a delivery came from; the host stores the offset per partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePartition {
    pub routing_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOffset {
    pub delivery_tag: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordValue {
    Body(String),
    Message(Box<Message>),
}

/// A converted delivery, ready for the destination write path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
    pub source_partition: SourcePartition,
    pub source_offset: SourceOffset,
    pub topic: String,
    /// Always `None`; the destination partitioner picks one from the key.
    pub partition: Option<i32>,
    #[serde(serialize_with = "schema_name")]
    pub key_schema: &'static Schema,
    pub key: MessageKey,
    #[serde(serialize_with = "schema_name")]
    pub value_schema: &'static Schema,
    pub value: RecordValue,
    pub timestamp: i64,
}

fn schema_name<S: Serializer>(schema: &&'static Schema, s: S) -> std::result::Result<S::Ok, S::Error> {
    match schema.name {
        Some(name) => s.serialize_str(name),
        None => s.serialize_str(schema.schema_type.name()),
    }
}

/// Converts deliveries into [`SourceRecord`]s.
///
/// Holds no per-delivery state; one builder can serve concurrent conversions.
#[derive(Debug, Clone)]
pub struct SourceRecordBuilder<C = SystemClock> {
    template: TopicTemplate,
    value_format: ValueFormat,
    clock: C,
}

impl SourceRecordBuilder<SystemClock> {
    pub fn new(template: TopicTemplate) -> Self {
        Self {
            template,
            value_format: ValueFormat::default(),
            clock: SystemClock,
        }
    }
}

impl<C: Clock> SourceRecordBuilder<C> {
    pub fn with_value_format(mut self, value_format: ValueFormat) -> Self {
        self.value_format = value_format;
        self
    }

    pub fn with_clock<D: Clock>(self, clock: D) -> SourceRecordBuilder<D> {
        SourceRecordBuilder {
            template: self.template,
            value_format: self.value_format,
            clock,
        }
    }

    pub fn template(&self) -> &TopicTemplate {
        &self.template
    }

    pub fn value_format(&self) -> ValueFormat {
        self.value_format
    }

    pub fn build(
        &self,
        consumer_tag: &str,
        envelope: &Envelope,
        properties: Option<&PropertyBag>,
        body: &[u8],
    ) -> Result<SourceRecord> {
        let (source_partition, source_offset) = source_position(envelope)?;
        let (key, value) = message::assemble(consumer_tag, envelope, properties, body)?;
        let topic = self.template.render(&value)?;

        let timestamp = value
            .basic_properties
            .as_ref()
            .and_then(|p| p.timestamp)
            .map_or_else(|| self.clock.now_millis(), |ts| ts.timestamp_millis());

        debug!(
            topic = %topic,
            routing_key = %source_partition.routing_key,
            delivery_tag = source_offset.delivery_tag,
            timestamp,
            "Built source record"
        );

        let (value_schema, value): (&'static Schema, _) = match self.value_format {
            ValueFormat::Body => (&*schema::BODY, RecordValue::Body(value.body)),
            ValueFormat::Message => (&*schema::VALUE, RecordValue::Message(Box::new(value))),
        };

        Ok(SourceRecord {
            source_partition,
            source_offset,
            topic,
            partition: None,
            key_schema: &*schema::KEY,
            key,
            value_schema,
            value,
            timestamp,
        })
    }
}

/// Delivery tags start at 1 and the offset is stored as a signed 64-bit value.
fn source_position(envelope: &Envelope) -> Result<(SourcePartition, SourceOffset)> {
    let routing_key = envelope
        .routing_key
        .clone()
        .ok_or_else(|| ConvertError::MalformedEnvelope("routing key is missing".to_owned()))?;
    if envelope.delivery_tag == 0 || i64::try_from(envelope.delivery_tag).is_err() {
        return Err(ConvertError::MalformedEnvelope(format!(
            "delivery tag {} is out of range",
            envelope.delivery_tag
        )));
    }
    Ok((
        SourcePartition { routing_key },
        SourceOffset {
            delivery_tag: envelope.delivery_tag,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use crate::headers::HeaderValue;
    use lapin::types::{AMQPValue, FieldTable};

    const NOW: i64 = 1_714_000_000_123;

    fn builder(template: &str) -> SourceRecordBuilder<FixedClock> {
        SourceRecordBuilder::new(TopicTemplate::parse_checked(template).unwrap())
            .with_clock(FixedClock(NOW))
    }

    fn orders_bag(headers: FieldTable) -> PropertyBag {
        PropertyBag::default()
            .with_message_id("m-1")
            .with_headers(headers)
    }

    #[test]
    fn converts_orders_delivery() {
        let mut headers = FieldTable::default();
        headers.insert("retry".into(), AMQPValue::LongInt(2));
        let bag = orders_bag(headers);
        let envelope = Envelope::new(42, "orders.created");

        let builder = builder("events.${body}").with_value_format(ValueFormat::Message);
        let record = builder.build("ctag", &envelope, Some(&bag), b"hello").unwrap();

        assert_eq!(record.source_partition.routing_key, "orders.created");
        assert_eq!(record.source_offset.delivery_tag, 42);
        assert_eq!(record.key.message_id.as_deref(), Some("m-1"));
        assert_eq!(record.topic, "events.hello");
        assert_eq!(record.partition, None);
        assert_eq!(record.timestamp, NOW);

        let RecordValue::Message(message) = &record.value else {
            panic!("expected full message value");
        };
        assert_eq!(message.body, "hello");
        let retry = &message.headers()["retry"];
        assert_eq!(retry.tag(), "int32");
        assert_eq!(retry, &HeaderValue::Int32(2));
    }

    #[test]
    fn body_format_emits_text_with_string_schema() {
        let record = builder("events.${body}")
            .build("ctag", &Envelope::new(1, "rk"), None, b"hello")
            .unwrap();
        assert_eq!(record.value, RecordValue::Body("hello".to_string()));
        assert_eq!(record.value_schema, &*schema::BODY);
        assert_eq!(record.key_schema, &*schema::KEY);
    }

    #[test]
    fn unsupported_header_produces_no_record() {
        let mut headers = FieldTable::default();
        headers.insert("retry".into(), AMQPValue::LongInt(2));
        headers.insert("x".into(), AMQPValue::FieldTable(FieldTable::default()));
        let bag = orders_bag(headers);

        let err = builder("events.${body}")
            .build("ctag", &Envelope::new(42, "orders.created"), Some(&bag), b"hello")
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedHeaderType { ref header, .. } if header == "x"));
    }

    #[test]
    fn explicit_timestamp_wins_over_clock() {
        let bag = PropertyBag::default().with_timestamp(1_600_000_000);
        let record = builder("t")
            .build("ctag", &Envelope::new(1, "rk"), Some(&bag), b"")
            .unwrap();
        assert_eq!(record.timestamp, 1_600_000_000_000);
    }

    #[test]
    fn unrepresentable_timestamp_property_fails() {
        let properties = lapin::BasicProperties::default().with_timestamp(u64::MAX);
        let bag = PropertyBag::from(&properties);
        let err = builder("t")
            .build("ctag", &Envelope::new(1, "rk"), Some(&bag), b"")
            .unwrap_err();
        assert_eq!(
            err,
            ConvertError::InvalidPropertyTimestamp { seconds: u64::MAX }
        );
        assert_eq!(err.kind(), "invalid_property_timestamp");
    }

    #[test]
    fn missing_properties_use_clock_and_null_key() {
        let record = builder("t")
            .build("ctag", &Envelope::new(1, "rk"), None, b"")
            .unwrap();
        assert_eq!(record.timestamp, NOW);
        assert_eq!(record.key.message_id, None);
    }

    #[test]
    fn identical_inputs_give_identical_records() {
        let mut headers = FieldTable::default();
        headers.insert("a".into(), AMQPValue::Double(0.5));
        headers.insert("b".into(), AMQPValue::LongString("x".into()));
        let bag = orders_bag(headers);
        let envelope = Envelope::new(9, "rk").with_exchange("ex").redelivered();
        let builder = builder("${envelope.exchange}.${body}").with_value_format(ValueFormat::Message);

        let first = builder.build("ctag", &envelope, Some(&bag), b"body").unwrap();
        let second = builder.build("ctag", &envelope, Some(&bag), b"body").unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[test]
    fn template_failure_is_surfaced() {
        let builder = SourceRecordBuilder::new(TopicTemplate::parse("${nope}").unwrap())
            .with_clock(FixedClock(NOW));
        let err = builder
            .build("ctag", &Envelope::new(1, "rk"), None, b"")
            .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::TemplateEvaluation(TemplateError::UnknownField { .. })
        ));
    }

    #[test]
    fn malformed_envelopes_are_rejected() {
        let builder = builder("t");
        let mut envelope = Envelope::new(1, "rk");
        envelope.routing_key = None;
        let err = builder.build("ctag", &envelope, None, b"").unwrap_err();
        assert_eq!(err.kind(), "malformed_envelope");

        for tag in [0, u64::MAX] {
            let err = builder
                .build("ctag", &Envelope::new(tag, "rk"), None, b"")
                .unwrap_err();
            assert!(matches!(err, ConvertError::MalformedEnvelope(_)));
        }
    }

    #[test]
    fn record_serializes_for_the_write_path() {
        let record = builder("events")
            .build(
                "ctag",
                &Envelope::new(3, "rk"),
                Some(&PropertyBag::default().with_message_id("m")),
                b"hi",
            )
            .unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "sourcePartition": { "routingKey": "rk" },
                "sourceOffset": { "deliveryTag": 3 },
                "topic": "events",
                "partition": null,
                "keySchema": "amqp_topic_bridge.MessageKey",
                "key": { "messageId": "m" },
                "valueSchema": "string",
                "value": "hi",
                "timestamp": NOW,
            })
        );
    }

    #[test]
    fn value_format_parses() {
        assert_eq!("Body".parse::<ValueFormat>().unwrap(), ValueFormat::Body);
        assert_eq!(" message ".parse::<ValueFormat>().unwrap(), ValueFormat::Message);
        assert!("avro".parse::<ValueFormat>().is_err());
    }
}
