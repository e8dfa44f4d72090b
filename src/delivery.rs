//! What the broker hands us for each delivery, detached from the lapin types.

use chrono::{DateTime, Utc};
use lapin::BasicProperties;
use lapin::message::Delivery;
use lapin::types::{FieldTable, ShortString};
use serde::Serialize;

/// Routing metadata of one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub delivery_tag: u64,
    pub is_redeliver: bool,
    pub exchange: Option<String>,
    pub routing_key: Option<String>,
}

impl Envelope {
    pub fn new(delivery_tag: u64, routing_key: impl Into<String>) -> Self {
        Self {
            delivery_tag,
            is_redeliver: false,
            exchange: None,
            routing_key: Some(routing_key.into()),
        }
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    pub fn redelivered(mut self) -> Self {
        self.is_redeliver = true;
        self
    }
}

impl From<&Delivery> for Envelope {
    fn from(delivery: &Delivery) -> Self {
        Self {
            delivery_tag: delivery.delivery_tag,
            is_redeliver: delivery.redelivered,
            exchange: Some(delivery.exchange.as_str().to_owned()),
            routing_key: Some(delivery.routing_key.as_str().to_owned()),
        }
    }
}

/// Basic properties of one delivery.
///
/// A delivery without properties is represented as `Option::<PropertyBag>::None`
/// by callers; a present bag may still have every field unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyBag {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: Option<FieldTable>,
    pub delivery_mode: Option<u8>,
    pub priority: Option<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    /// Seconds since the epoch, as carried on the wire.
    pub timestamp: Option<u64>,
    pub kind: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
}

impl PropertyBag {
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_timestamp(mut self, seconds: u64) -> Self {
        self.timestamp = Some(seconds);
        self
    }

    pub fn with_headers(mut self, headers: FieldTable) -> Self {
        self.headers = Some(headers);
        self
    }
}

fn owned(value: &Option<ShortString>) -> Option<String> {
    value.as_ref().map(|s| s.as_str().to_owned())
}

/// AMQP timestamps are whole seconds since the epoch.
pub(crate) fn amqp_timestamp(seconds: u64) -> Option<DateTime<Utc>> {
    i64::try_from(seconds)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
}

impl From<&BasicProperties> for PropertyBag {
    fn from(properties: &BasicProperties) -> Self {
        Self {
            content_type: owned(properties.content_type()),
            content_encoding: owned(properties.content_encoding()),
            headers: properties.headers().clone(),
            delivery_mode: *properties.delivery_mode(),
            priority: *properties.priority(),
            correlation_id: owned(properties.correlation_id()),
            reply_to: owned(properties.reply_to()),
            expiration: owned(properties.expiration()),
            message_id: owned(properties.message_id()),
            timestamp: *properties.timestamp(),
            kind: owned(properties.kind()),
            user_id: owned(properties.user_id()),
            app_id: owned(properties.app_id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::AMQPValue;

    #[test]
    fn property_bag_copies_basic_properties() {
        let mut headers = FieldTable::default();
        headers.insert("retry".into(), AMQPValue::LongInt(2));
        let properties = BasicProperties::default()
            .with_content_type("text/plain".into())
            .with_message_id("m-1".into())
            .with_delivery_mode(2)
            .with_priority(5)
            .with_type("order".into())
            .with_timestamp(1_700_000_000)
            .with_headers(headers.clone());

        let bag = PropertyBag::from(&properties);
        assert_eq!(bag.content_type.as_deref(), Some("text/plain"));
        assert_eq!(bag.message_id.as_deref(), Some("m-1"));
        assert_eq!(bag.delivery_mode, Some(2));
        assert_eq!(bag.priority, Some(5));
        assert_eq!(bag.kind.as_deref(), Some("order"));
        assert_eq!(bag.timestamp, Some(1_700_000_000));
        assert_eq!(bag.headers, Some(headers));
        assert_eq!(bag.app_id, None);
    }

    #[test]
    fn unrepresentable_timestamp_is_kept_raw() {
        let properties = BasicProperties::default().with_timestamp(u64::MAX);
        assert_eq!(PropertyBag::from(&properties).timestamp, Some(u64::MAX));
    }

    #[test]
    fn amqp_timestamp_rejects_out_of_range_seconds() {
        assert_eq!(
            amqp_timestamp(1_600_000_000).map(|ts| ts.timestamp_millis()),
            Some(1_600_000_000_000)
        );
        assert_eq!(amqp_timestamp(u64::MAX), None);
        assert_eq!(amqp_timestamp(i64::MAX as u64), None);
    }

    #[test]
    fn envelope_serializes_with_schema_field_names() {
        let envelope = Envelope::new(42, "orders.created").with_exchange("orders");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "deliveryTag": 42,
                "isRedeliver": false,
                "exchange": "orders",
                "routingKey": "orders.created",
            })
        );
    }
}
