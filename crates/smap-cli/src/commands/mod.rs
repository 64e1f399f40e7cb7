//! Command implementations for the smap CLI
//!
//! Each command lives in its own submodule with its clap arguments and an
//! `execute` entry point.

mod check;
mod generate;

pub use check::{CheckArgs, execute as check_urls};
pub use generate::{GenerateArgs, execute as generate_sitemaps};
