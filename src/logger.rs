//! Structured JSON logger bound to a service name
//!
//! Each [`Logger`] owns its own `tracing` dispatcher, so no process-wide
//! subscriber is installed and two loggers never share level or service
//! state unless one is cloned from the other.

use std::fmt;
use std::io;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{reload, Registry};

use crate::env::get_env_string;

const DEFAULT_SERVICE_NAME: &str = "undefined";
const DEFAULT_LEVEL: LevelFilter = LevelFilter::INFO;

/// Logger settings
#[derive(Debug, Clone, Default)]
pub struct LoggerConfig {
    /// Value of the `service` field on every record
    pub service_name: String,
    /// Level name; unknown or empty names mean `info`
    pub level: String,
}

impl LoggerConfig {
    pub fn new(service_name: impl Into<String>, level: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            level: level.into(),
        }
    }

    /// Read `SERVICE_NAME` and `LOG_LEVEL`.
    pub fn from_env() -> Self {
        Self {
            service_name: get_env_string("SERVICE_NAME", DEFAULT_SERVICE_NAME),
            level: get_env_string("LOG_LEVEL", "info"),
        }
    }
}

/// Parse a level name case-insensitively.
///
/// `warning` is accepted for `warn`, and `fatal`/`panic` collapse to `error`.
/// Anything else, including an empty string, yields `info`.
pub fn parse_level(name: &str) -> LevelFilter {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" | "fatal" | "panic" => LevelFilter::ERROR,
        _ => DEFAULT_LEVEL,
    }
}

/// Structured logger writing one JSON object per record:
/// `{"level":"info","msg":"...","service":"...","time":"..."}`.
#[derive(Clone)]
pub struct Logger {
    service_name: Arc<str>,
    dispatch: Dispatch,
    level: reload::Handle<LevelFilter, Registry>,
}

impl Logger {
    /// Create a logger writing to stdout.
    pub fn new(config: LoggerConfig) -> Self {
        Self::with_writer(config, io::stdout)
    }

    /// Create a logger writing to `make_writer`.
    pub fn with_writer<W>(config: LoggerConfig, make_writer: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let service_name: Arc<str> = if config.service_name.is_empty() {
            Arc::from(DEFAULT_SERVICE_NAME)
        } else {
            Arc::from(config.service_name.as_str())
        };

        let (filter, level) = reload::Layer::new(parse_level(&config.level));
        let subscriber = tracing_subscriber::registry().with(filter).with(
            tracing_subscriber::fmt::layer()
                .event_format(ServiceJsonFormat {
                    service_name: Arc::clone(&service_name),
                })
                .with_writer(make_writer),
        );

        Self {
            service_name,
            dispatch: Dispatch::new(subscriber),
            level,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Current level filter
    pub fn level(&self) -> LevelFilter {
        self.level.clone_current().unwrap_or(DEFAULT_LEVEL)
    }

    /// Change the level; unparseable names reset it to `info`.
    pub fn set_level(&self, level: &str) {
        let new_level = parse_level(level);
        if let Err(e) = self.level.modify(|filter| *filter = new_level) {
            self.warn(format_args!("failed to change log level: {}", e));
        }
    }

    /// Run `f` with this logger as the active dispatcher, so `tracing`
    /// events emitted inside it (including this crate's own) are written here.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    pub fn trace(&self, message: impl fmt::Display) {
        self.log(Level::TRACE, &message);
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::DEBUG, &message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::INFO, &message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Level::WARN, &message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::ERROR, &message);
    }

    fn log(&self, level: Level, message: &dyn fmt::Display) {
        self.in_scope(|| match level {
            Level::TRACE => tracing::trace!("{}", message),
            Level::DEBUG => tracing::debug!("{}", message),
            Level::INFO => tracing::info!("{}", message),
            Level::WARN => tracing::warn!("{}", message),
            _ => tracing::error!("{}", message),
        });
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("service_name", &self.service_name)
            .field("level", &self.level())
            .finish()
    }
}

/// Lowercase level names as they appear in the `level` field
fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warning",
        _ => "error",
    }
}

/// Event formatter emitting a flat JSON object tagged with the service name.
struct ServiceJsonFormat {
    service_name: Arc<str>,
}

impl<S, N> FormatEvent<S, N> for ServiceJsonFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = JsonFieldVisitor::default();
        event.record(&mut fields);

        let mut record = fields.fields;
        record.insert(
            "level".into(),
            Value::from(level_name(event.metadata().level())),
        );
        record.insert("msg".into(), Value::from(fields.message.unwrap_or_default()));
        record.insert("service".into(), Value::from(&*self.service_name));
        record.insert(
            "time".into(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );

        let line = serde_json::to_string(&record).map_err(|_| fmt::Error)?;
        writeln!(writer, "{}", line)
    }
}

#[derive(Default)]
struct JsonFieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl JsonFieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for JsonFieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::from(format!("{:?}", value)));
    }
}
