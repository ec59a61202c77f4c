// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! aio CLI - demo commands on the cooperative runtime.

mod commands;
mod help;
mod output;

use std::env;
use std::net::SocketAddr;
use std::process;
use std::time::Duration;

use aio_rt::clock::delay_from_secs;
use aio_rt::{BoxError, RuntimeConfig};
use tracing_subscriber::EnvFilter;

fn main() {
    output::init();
    let mut args: Vec<String> = env::args().collect();

    let config = match load_config(&mut args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}: {}", output::error_label(), err);
            process::exit(1);
        }
    };
    init_tracing(&config);

    if args.len() < 2 {
        help::print_usage();
        return;
    }

    let result = match args[1].as_str() {
        "countdown" => {
            if args.len() < 3 {
                eprintln!("Usage: aio countdown <n> [secs]");
                process::exit(1);
            }
            let from: u32 = parse_arg(&args[2], "count");
            let interval = match args.get(3) {
                Some(secs) => delay_from_secs(parse_arg(secs, "interval")),
                None => Duration::from_secs(1),
            };
            commands::countdown::cmd_countdown(&config, from, interval)
        }
        "sleepers" => {
            if args.len() < 3 {
                eprintln!("Usage: aio sleepers <secs>...");
                process::exit(1);
            }
            let delays: Vec<f64> = args[2..].iter().map(|s| parse_arg(s, "delay")).collect();
            commands::sleepers::cmd_sleepers(&config, &delays)
        }
        "echo" => {
            if args.len() < 3 {
                eprintln!("Usage: aio echo <addr> [n]");
                process::exit(1);
            }
            let addr: SocketAddr = parse_arg(&args[2], "address");
            let limit = args.get(3).map(|n| parse_arg::<usize>(n, "connection limit"));
            commands::echo::cmd_echo(&config, addr, limit)
        }
        "config" => commands::config::cmd_config(&config),
        "help" | "--help" | "-h" => {
            help::print_usage();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("aio {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => {
            eprintln!("{}: unknown command: {}", output::error_label(), other);
            eprintln!("{}: run `aio help` for the command list", output::hint_label());
            process::exit(1);
        }
    };

    if let Err(err) = result {
        eprintln!("{}: {}", output::error_label(), err);
        process::exit(1);
    }
}

/// Pull `--config <file>` (or `--config=<file>`) out of `args` and build the
/// runtime configuration, then apply environment overrides.
fn load_config(args: &mut Vec<String>) -> Result<RuntimeConfig, BoxError> {
    let mut path = None;
    if let Some(pos) = args.iter().position(|a| a == "--config" || a.starts_with("--config=")) {
        let flag = args.remove(pos);
        path = match flag.strip_prefix("--config=") {
            Some(value) => Some(value.to_string()),
            None if pos < args.len() => Some(args.remove(pos)),
            None => return Err("--config needs a file argument".into()),
        };
    }

    let config = match path {
        Some(path) => RuntimeConfig::from_json_file(path)?,
        None => RuntimeConfig::default(),
    };
    Ok(config.apply_env()?)
}

fn init_tracing(config: &RuntimeConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn parse_arg<T: std::str::FromStr>(raw: &str, what: &str) -> T {
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            eprintln!("{}: invalid {}: {}", output::error_label(), what, raw);
            process::exit(1);
        }
    }
}
