use std::fmt::{self, Write as _};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{JsonFields, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use crate::config::LoggingConfig;

/// Maps DEBUG/INFO/WARN/ERROR style levels onto an env filter directive.
/// Unknown levels log at info; `target=level` directives pass through.
fn level_directive(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    if level.contains('=') {
        return level;
    }
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => level,
        "warning" => "warn".to_string(),
        _ => "info".to_string(),
    }
}

fn configured_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level_directive(level)).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Cloud Logging severity names
fn severity(level: &Level) -> &'static str {
    match *level {
        Level::TRACE | Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARNING",
        _ => "ERROR",
    }
}

#[derive(Default)]
struct JsonVisitor {
    fields: Map<String, Value>,
}

impl Visit for JsonVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields.insert(field.name().to_string(), Value::from(format!("{:?}", value)));
    }
}

/// One JSON object per line with a `severity` key and no timestamp, which
/// is the shape Cloud Logging parses from a container's stdout.
/// Span fields are flattened in from the root span down, then event fields.
struct CloudLoggingFormat;

impl<S, N> FormatEvent<S, N> for CloudLoggingFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let mut line = Map::new();
        line.insert("severity".to_string(), Value::from(severity(metadata.level())));
        line.insert("target".to_string(), Value::from(metadata.target()));

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<FormattedFields<N>>() {
                    if let Ok(Value::Object(span_fields)) = serde_json::from_str(&fields.fields) {
                        line.extend(span_fields);
                    }
                }
            }
        }

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        line.extend(visitor.fields);

        writeln!(writer, "{}", Value::Object(line))
    }
}

fn json_subscriber<W>(filter: EnvFilter, make_writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .fmt_fields(JsonFields::new())
        .event_format(CloudLoggingFormat)
        .with_env_filter(filter)
        .with_writer(make_writer)
        .finish()
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| configured_filter(&config.level));

    match config.format.as_str() {
        "json" => json_subscriber(filter, std::io::stdout).init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
