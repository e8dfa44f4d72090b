//! Key and value records assembled from a delivery.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::trace;

use crate::delivery::{Envelope, PropertyBag, amqp_timestamp};
use crate::error::{ConvertError, Result};
use crate::headers::{HeaderValue, tag_headers};

/// Record key. Only the message id takes part in partition assignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    pub message_id: Option<String>,
}

/// Basic properties as they appear in the value record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Properties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: IndexMap<String, HeaderValue>,
    pub delivery_mode: Option<i32>,
    pub priority: Option<i32>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
}

/// The value record: the delivery as it reached the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub consumer_tag: String,
    pub envelope: Envelope,
    pub basic_properties: Option<Properties>,
    pub body: String,
}

static NO_HEADERS: LazyLock<IndexMap<String, HeaderValue>> = LazyLock::new(IndexMap::new);

impl Message {
    /// Tagged headers, empty when the delivery had no properties.
    pub fn headers(&self) -> &IndexMap<String, HeaderValue> {
        self.basic_properties
            .as_ref()
            .map_or(&*NO_HEADERS, |p| &p.headers)
    }
}

pub fn key(properties: Option<&PropertyBag>) -> MessageKey {
    MessageKey {
        message_id: properties.and_then(|p| p.message_id.clone()),
    }
}

pub fn properties(bag: Option<&PropertyBag>) -> Result<Option<Properties>> {
    let Some(bag) = bag else {
        trace!("Delivery has no basic properties");
        return Ok(None);
    };

    let timestamp = bag
        .timestamp
        .map(|seconds| {
            amqp_timestamp(seconds).ok_or(ConvertError::InvalidPropertyTimestamp { seconds })
        })
        .transpose()?;

    Ok(Some(Properties {
        content_type: bag.content_type.clone(),
        content_encoding: bag.content_encoding.clone(),
        headers: tag_headers(bag.headers.as_ref())?,
        delivery_mode: bag.delivery_mode.map(i32::from),
        priority: bag.priority.map(i32::from),
        correlation_id: bag.correlation_id.clone(),
        reply_to: bag.reply_to.clone(),
        expiration: bag.expiration.clone(),
        message_id: bag.message_id.clone(),
        timestamp,
        kind: bag.kind.clone(),
        user_id: bag.user_id.clone(),
        app_id: bag.app_id.clone(),
    }))
}

/// Build the value record. The body is decoded as UTF-8; invalid sequences
/// are replaced rather than rejected.
pub fn value(
    consumer_tag: &str,
    envelope: &Envelope,
    bag: Option<&PropertyBag>,
    body: &[u8],
) -> Result<Message> {
    Ok(Message {
        consumer_tag: consumer_tag.to_owned(),
        envelope: envelope.clone(),
        basic_properties: properties(bag)?,
        body: String::from_utf8_lossy(body).into_owned(),
    })
}

pub fn assemble(
    consumer_tag: &str,
    envelope: &Envelope,
    bag: Option<&PropertyBag>,
    body: &[u8],
) -> Result<(MessageKey, Message)> {
    let value = value(consumer_tag, envelope, bag, body)?;
    Ok((key(bag), value))
}
