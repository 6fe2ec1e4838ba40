//! Tracing subscriber setup.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Coloured, human-readable text.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
    /// Plain `key=value` text without ANSI colours.
    Logfmt,
}

impl FromStr for LogFormat {
    type Err = Infallible;

    /// Unknown names fall back to [`LogFormat::Pretty`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "logfmt" => Self::Logfmt,
            _ => Self::Pretty,
        })
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
            Self::Logfmt => "logfmt",
        })
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default level,
/// which is `debug` when `debug` is set and `info` otherwise.
pub fn init(format: LogFormat, debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Logfmt => builder.with_ansi(false).init(),
        LogFormat::Pretty => builder.with_ansi(true).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_formats() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("LOGFMT".parse::<LogFormat>().unwrap(), LogFormat::Logfmt);
        assert_eq!("colored".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    }

    #[test]
    fn display_round_trips_names() {
        for format in [LogFormat::Pretty, LogFormat::Json, LogFormat::Logfmt] {
            assert_eq!(format.to_string().parse::<LogFormat>().unwrap(), format);
        }
    }
}
