//! Command line arguments for the msgbus benchmark

use crate::bus::api::ThreadMode;
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;
use strum::IntoEnumIterator;

/// Posts messages through a bus and reports delivery throughput
#[derive(Parser, Debug, Clone)]
#[command(name = "msgbus")]
#[command(about = "In-process message bus benchmark")]
#[command(version)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config-file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Number of messages to post
    #[arg(short = 'n', long = "messages", value_name = "COUNT", default_value_t = 10_000)]
    pub messages: usize,

    /// Number of subscribers receiving each message
    #[arg(short = 'k', long = "subscribers", value_name = "COUNT", default_value_t = 4)]
    pub subscribers: usize,

    /// Thread mode of the benchmark handlers
    #[arg(
        short = 't',
        long = "thread-mode",
        value_name = "MODE",
        default_value = "posting",
        value_parser = parse_thread_mode
    )]
    pub thread_mode: ThreadMode,

    /// Post every message as sticky
    #[arg(long = "sticky")]
    pub sticky: bool,

    /// Deliver only to handlers of the exact message type
    #[arg(long = "no-inheritance")]
    pub no_inheritance: bool,

    /// Seconds to wait for queued deliveries to finish
    #[arg(long = "timeout", value_name = "SECONDS", default_value_t = 30)]
    pub timeout: u64,

    /// Force colour on or off; follows the terminal when unset
    #[arg(short = 'g', long = "color")]
    pub color: Option<bool>,

    /// Log level
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log file path
    #[arg(short = 'f', long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", value_parser = ["text", "ext", "json"])]
    pub log_format: Option<String>,
}

fn parse_thread_mode(value: &str) -> Result<ThreadMode, String> {
    ThreadMode::from_str(value).map_err(|_| {
        let known: Vec<String> = ThreadMode::iter().map(|mode| mode.to_string()).collect();
        format!("unknown thread mode '{value}' ({})", known.join(", "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["msgbus"]).unwrap();
        assert_eq!(args.messages, 10_000);
        assert_eq!(args.subscribers, 4);
        assert_eq!(args.thread_mode, ThreadMode::Posting);
        assert!(!args.sticky);
        assert!(args.config_file.is_none());
    }

    #[test]
    fn test_thread_mode_values() {
        let args = Args::try_parse_from(["msgbus", "-t", "main-ordered", "-n", "5"]).unwrap();
        assert_eq!(args.thread_mode, ThreadMode::MainOrdered);
        assert_eq!(args.messages, 5);

        let error = Args::try_parse_from(["msgbus", "--thread-mode", "sideways"]).unwrap_err();
        assert!(error.to_string().contains("unknown thread mode"));
    }

    #[test]
    fn test_log_format_is_restricted() {
        assert!(Args::try_parse_from(["msgbus", "-o", "json"]).is_ok());
        assert!(Args::try_parse_from(["msgbus", "-o", "xml"]).is_err());
    }
}
