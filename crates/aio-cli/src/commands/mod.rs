// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! CLI command implementations.

pub mod config;
pub mod countdown;
pub mod echo;
pub mod sleepers;
