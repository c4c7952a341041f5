//! Logger initialization.

use std::io::Write;

use colored::Colorize;
use log::LevelFilter;

/// Initializes `env_logger` with colored levels. `RUST_LOG` is honored,
/// then overridden by `verbose`, which raises the crate's level to debug
/// and adds the log target to each line.
pub fn init_logger(verbose: bool) -> Result<(), log::SetLoggerError> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    builder.filter_module("html5ever", LevelFilter::Error);
    builder.filter_module("selectors", LevelFilter::Warn);
    builder.filter_module("sqlx", LevelFilter::Warn);
    builder.filter_module("reqwest", LevelFilter::Info);
    builder.filter_module("hyper", LevelFilter::Info);

    builder.format(move |buf, record| {
        let level = record.level();
        let colored_level = match level {
            log::Level::Error => level.to_string().red(),
            log::Level::Warn => level.to_string().yellow(),
            log::Level::Info => level.to_string().green(),
            log::Level::Debug => level.to_string().blue(),
            log::Level::Trace => level.to_string().purple(),
        };
        if verbose {
            writeln!(
                buf,
                "{} [{}] {} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                colored_level,
                record.target().cyan(),
                record.args()
            )
        } else {
            writeln!(
                buf,
                "{} [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                colored_level,
                record.args()
            )
        }
    });

    // try_init so tests may initialize more than once
    builder.try_init()
}
