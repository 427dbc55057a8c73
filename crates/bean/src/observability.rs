//! Bean's logger: timestamped single-line records on stderr with the
//! classic level tags (`[E]`, `[W]`, ...), or the JSON layer when asked.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

const LOG_LEVEL_ENV_NAME: &str = "BEAN_LOG_LEVEL";

const LOG_FORMAT_TEXT: &str = "text";
const LOG_FORMAT_JSON: &str = "json";

/// If in debug mode, default level is debug to get maximum logging
#[cfg(debug_assertions)]
const DEFAULT_LOG_LEVEL: &str = "debug";

/// If not in debug mode, default level is info to get important logs
#[cfg(not(debug_assertions))]
const DEFAULT_LOG_LEVEL: &str = "info";

enum LogFormat {
    Text,
    Json,
}

fn detect_log_format(log_format: Option<&str>) -> Result<LogFormat> {
    match log_format {
        None | Some(LOG_FORMAT_TEXT) => Ok(LogFormat::Text),
        Some(LOG_FORMAT_JSON) => Ok(LogFormat::Json),
        Some(unknown) => bail!("unknown log format: {unknown}"),
    }
}

fn detect_log_level(is_debug: bool) -> Result<Level> {
    let level: Cow<str> = if is_debug {
        "debug".into()
    } else if let Ok(level) = std::env::var(LOG_LEVEL_ENV_NAME) {
        level.into()
    } else {
        DEFAULT_LOG_LEVEL.into()
    };
    Level::from_str(level.as_ref()).context("failed to parse log level")
}

fn level_tag(level: &Level) -> &'static str {
    if *level == Level::ERROR {
        "[E]"
    } else if *level == Level::WARN {
        "[W]"
    } else if *level == Level::INFO {
        "[I]"
    } else if *level == Level::DEBUG {
        "[D]"
    } else {
        "[T]"
    }
}

struct LogLine;

impl<S, N> FormatEvent<S, N> for LogLine
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
        write!(
            writer,
            "{} {} ",
            chrono::Local::now().format("%Y/%m/%d %H:%M:%S"),
            level_tag(event.metadata().level())
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

pub fn init(debug: bool, log_format: Option<&str>) -> Result<()> {
    let level = detect_log_level(debug)?;
    let filter = tracing_subscriber::filter::LevelFilter::from(level);
    let registry = tracing_subscriber::registry().with(filter);

    match detect_log_format(log_format)? {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .event_format(LogLine)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to init logger: {err}"))?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to init logger: {err}"))?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn test_level_tags() {
        assert_eq!(level_tag(&Level::ERROR), "[E]");
        assert_eq!(level_tag(&Level::WARN), "[W]");
        assert_eq!(level_tag(&Level::INFO), "[I]");
        assert_eq!(level_tag(&Level::DEBUG), "[D]");
        assert_eq!(level_tag(&Level::TRACE), "[T]");
    }

    #[test]
    fn test_detect_log_format() {
        assert!(matches!(detect_log_format(None), Ok(LogFormat::Text)));
        assert!(matches!(
            detect_log_format(Some("text")),
            Ok(LogFormat::Text)
        ));
        assert!(matches!(
            detect_log_format(Some("json")),
            Ok(LogFormat::Json)
        ));
        assert!(detect_log_format(Some("yaml")).is_err());
    }

    #[test]
    fn test_detect_log_level_is_debug() {
        assert_eq!(detect_log_level(true).unwrap(), Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_detect_log_level_from_env() {
        std::env::set_var(LOG_LEVEL_ENV_NAME, "error");
        let level = detect_log_level(false).unwrap();
        std::env::remove_var(LOG_LEVEL_ENV_NAME);
        assert_eq!(level, Level::ERROR);
    }

    #[test]
    #[serial]
    fn test_detect_log_level_default() {
        std::env::remove_var(LOG_LEVEL_ENV_NAME);
        if cfg!(debug_assertions) {
            assert_eq!(detect_log_level(false).unwrap(), Level::DEBUG);
        } else {
            assert_eq!(detect_log_level(false).unwrap(), Level::INFO);
        }
    }
}
