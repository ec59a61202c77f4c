// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `aio config`: print the effective configuration.

use aio_rt::{BoxError, RuntimeConfig};

/// Print `config` as JSON, after file loading and environment overrides.
/// The output is itself a valid `--config` file.
pub fn cmd_config(config: &RuntimeConfig) -> Result<(), BoxError> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
