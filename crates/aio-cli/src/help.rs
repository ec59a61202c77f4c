// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Help text for CLI commands.

use crate::output;

pub fn print_usage() {
    println!(
        "{} {} - cooperative tasks on one thread",
        output::title("aio"),
        output::version(env!("CARGO_PKG_VERSION"))
    );
    println!();
    println!(
        "{}: {} {} {} {}",
        output::section_header("Usage"),
        output::command("aio"),
        output::arg("[--config <file>]"),
        output::arg("<command>"),
        output::arg("[args]")
    );
    println!();
    println!("{}", output::section_header("Commands:"));
    println!(
        "  {} {}  Count down from n, one line per interval",
        output::command("countdown"),
        output::arg("<n> [secs]")
    );
    println!(
        "  {} {}   One sleeping task per delay, print wake order",
        output::command("sleepers"),
        output::arg("<secs>...")
    );
    println!(
        "  {} {} Echo server; stop after n connections",
        output::command("echo"),
        output::arg("<addr> [n]")
    );
    println!("  {}               Print the effective configuration", output::command("config"));
    println!("  {}                 Show this help", output::command("help"));
    println!("  {}              Show version", output::command("version"));
    println!();
    println!("{}", output::section_header("Environment:"));
    println!("  {}     poll | epoll (overrides config)", output::arg("AIO_BACKEND"));
    println!("  {}         default log filter (overrides config)", output::arg("AIO_LOG"));
    println!("  {}        tracing filter, wins over both", output::arg("RUST_LOG"));
}
