use std::fmt;
use std::str::FromStr;

use anyhow::{Context, anyhow};

use crate::record::ValueFormat;
use crate::topic::TopicTemplate;

/// What the bridge does with a delivery that cannot be converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Reject without requeue so the broker can dead-letter it.
    #[default]
    Reject,
    /// Stop consuming and surface the error.
    Halt,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(FailurePolicy::Reject),
            "halt" => Ok(FailurePolicy::Halt),
            other => Err(format!("unknown policy '{other}', expected 'reject' or 'halt'")),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Reject => f.write_str("reject"),
            FailurePolicy::Halt => f.write_str("halt"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source_dsn: String,
    pub source_queue: String,
    pub consumer_tag: String,
    pub prefetch_count: u16,
    pub topic_template: TopicTemplate,
    pub value_format: ValueFormat,
    pub on_conversion_error: FailurePolicy,
    pub health_port: u16,
}

fn optional_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("Invalid value for {name}: '{raw}'")),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Build a configuration from environment variables.
    ///
    /// Required variables: `SOURCE_DSN`, `TOPIC_TEMPLATE`.
    /// Optional variables: `SOURCE_QUEUE`, `CONSUMER_TAG`, `PREFETCH_COUNT`,
    /// `VALUE_FORMAT`, `ON_CONVERSION_ERROR`, `HEALTH_PORT`.
    ///
    /// # Errors
    /// Returns an error if a required variable is missing, if an optional
    /// variable cannot be parsed, or if the topic template is malformed or
    /// references a field the value record does not have.
    pub fn from_env() -> anyhow::Result<Self> {
        let raw_template =
            std::env::var("TOPIC_TEMPLATE").context("TOPIC_TEMPLATE environment variable not set")?;
        let topic_template = TopicTemplate::parse_checked(&raw_template)
            .with_context(|| format!("Invalid TOPIC_TEMPLATE '{raw_template}'"))?;

        Ok(Self {
            source_dsn: std::env::var("SOURCE_DSN")
                .context("SOURCE_DSN environment variable not set")?,
            source_queue: std::env::var("SOURCE_QUEUE").unwrap_or_else(|_| "bridge".to_string()),
            consumer_tag: std::env::var("CONSUMER_TAG")
                .unwrap_or_else(|_| "amqp-topic-bridge".to_string()),
            prefetch_count: optional_var("PREFETCH_COUNT", 1)?,
            topic_template,
            value_format: optional_var("VALUE_FORMAT", ValueFormat::default())?,
            on_conversion_error: optional_var("ON_CONVERSION_ERROR", FailurePolicy::default())?,
            health_port: optional_var("HEALTH_PORT", 8080)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    // Global mutex to serialize environment-variable dependent tests
    static ENV_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_MUTEX.get_or_init(|| Mutex::new(()))
    }

    const VARS: [&str; 8] = [
        "SOURCE_DSN",
        "SOURCE_QUEUE",
        "CONSUMER_TAG",
        "PREFETCH_COUNT",
        "TOPIC_TEMPLATE",
        "VALUE_FORMAT",
        "ON_CONVERSION_ERROR",
        "HEALTH_PORT",
    ];

    fn clear_env() {
        for k in VARS {
            unsafe { std::env::remove_var(k) };
        }
    }

    fn set(k: &str, v: &str) {
        unsafe { std::env::set_var(k, v) };
    }

    #[test]
    fn from_env_errors_when_required_missing() {
        let _g = env_lock().lock().unwrap();
        clear_env();

        let err = Config::from_env().unwrap_err();
        assert!(format!("{err:#}").contains("TOPIC_TEMPLATE"));

        set("TOPIC_TEMPLATE", "events.${body}");
        let err = Config::from_env().unwrap_err();
        assert!(format!("{err:#}").contains("SOURCE_DSN"));
    }

    #[test]
    fn from_env_uses_defaults_for_optionals() {
        let _g = env_lock().lock().unwrap();
        clear_env();

        set("SOURCE_DSN", "amqp://src");
        set("TOPIC_TEMPLATE", "events.${body}");

        let cfg = Config::from_env().expect("should parse");
        assert_eq!(cfg.source_queue, "bridge");
        assert_eq!(cfg.consumer_tag, "amqp-topic-bridge");
        assert_eq!(cfg.prefetch_count, 1);
        assert_eq!(cfg.topic_template.as_str(), "events.${body}");
        assert_eq!(cfg.value_format, ValueFormat::Body);
        assert_eq!(cfg.on_conversion_error, FailurePolicy::Reject);
        assert_eq!(cfg.health_port, 8080);
    }

    #[test]
    fn from_env_parses_overrides() {
        let _g = env_lock().lock().unwrap();
        clear_env();

        set("SOURCE_DSN", "amqp://src");
        set("SOURCE_QUEUE", "q1");
        set("CONSUMER_TAG", "ctag");
        set("PREFETCH_COUNT", "50");
        set("TOPIC_TEMPLATE", "${envelope.routingKey}");
        set("VALUE_FORMAT", "message");
        set("ON_CONVERSION_ERROR", "halt");
        set("HEALTH_PORT", "9000");

        let cfg = Config::from_env().expect("should parse");
        assert_eq!(cfg.source_queue, "q1");
        assert_eq!(cfg.consumer_tag, "ctag");
        assert_eq!(cfg.prefetch_count, 50);
        assert_eq!(cfg.value_format, ValueFormat::Message);
        assert_eq!(cfg.on_conversion_error, FailurePolicy::Halt);
        assert_eq!(cfg.health_port, 9000);
    }

    #[test]
    fn from_env_rejects_bad_values() {
        let _g = env_lock().lock().unwrap();
        clear_env();

        set("SOURCE_DSN", "amqp://src");
        set("TOPIC_TEMPLATE", "events.${nope}");
        let err = format!("{:#}", Config::from_env().unwrap_err());
        assert!(err.contains("TOPIC_TEMPLATE"));
        assert!(err.contains("nope"));

        set("TOPIC_TEMPLATE", "events");
        set("HEALTH_PORT", "not-a-port");
        let err = format!("{:#}", Config::from_env().unwrap_err());
        assert!(err.contains("HEALTH_PORT"));

        clear_env();
        set("SOURCE_DSN", "amqp://src");
        set("TOPIC_TEMPLATE", "events");
        set("ON_CONVERSION_ERROR", "retry");
        let err = format!("{:#}", Config::from_env().unwrap_err());
        assert!(err.contains("ON_CONVERSION_ERROR"));
    }
}
