//! Application configuration: constants, the library-level crawl config,
//! and the CLI flag surface.

mod cli;
mod constants;
mod types;

pub use cli::{
    default_save_path, marked_url_args, parse_cutoff_date, parse_duration, separate_args, Opt,
};
pub use constants::*;
pub use types::{validate_dsn, CrawlConfig};
