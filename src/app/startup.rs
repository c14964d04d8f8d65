//! Binary entry point: arguments, logging, configuration, then the benchmark

use crate::app::bench::{self, BenchOptions, BenchReport};
use crate::app::cli::args::Args;
use crate::app::cli::config::load_config;
use crate::bus::api::{EventBusBuilder, EventBusResult};
use crate::core::error_handling::log_error_with_context;
use crate::core::logging::{init_logging, LogFormat};
use crate::core::version;
use clap::Parser;
use std::io::IsTerminal;
use std::str::FromStr;
use std::time::Duration;

pub fn startup() {
    let args = Args::parse();

    let use_color = args
        .color
        .unwrap_or_else(|| std::io::stdout().is_terminal());
    colored::control::set_override(use_color);

    let log_format = args
        .log_format
        .as_deref()
        .and_then(|f| LogFormat::from_str(f).ok())
        .unwrap_or_default();
    let log_file = args.log_file.as_ref().map(|p| p.to_string_lossy().to_string());
    if let Err(e) = init_logging(
        args.log_level.as_deref(),
        log_format,
        log_file.as_deref(),
        use_color,
    ) {
        eprintln!("Error initialising logging: {e}");
        std::process::exit(1);
    }
    log::info!("{}", version::banner());

    match run(&args) {
        Ok(report) => {
            report.render().printstd();
            if !report.completed() {
                std::process::exit(2);
            }
        }
        Err(e) => {
            log_error_with_context(&e, "Benchmark failed");
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> EventBusResult<BenchReport> {
    let mut config = load_config(args.config_file.as_deref())?;
    if args.no_inheritance {
        config.event_inheritance = false;
    }
    let options = BenchOptions {
        messages: args.messages,
        subscribers: args.subscribers,
        thread_mode: args.thread_mode,
        sticky: args.sticky,
        timeout: Duration::from_secs(args.timeout),
    };
    bench::run(EventBusBuilder::from_config(config), &options)
}
