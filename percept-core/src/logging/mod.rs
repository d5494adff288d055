use std::{path::Path, sync::OnceLock, time::Instant};

use anyhow::Context;
use fern::colors::{Color, ColoredLevelConfig};

pub mod rate;

/// Sets up a locally available set of logging macros.
///
/// The `log` crate allows a `target` parameter on every record, which
/// lets readers filter messages by origin. This macro sets that target
/// to the name of the current node (as carried by its context), so two
/// nodes of the same type with different names produce distinguishable
/// logs.
#[macro_export]
macro_rules! setup_logging {
    ($context: ident) => {
        setup_logging!($context $)
    };
    ($context: ident $dol:tt) => {
        let _context = &$context;
        #[allow(unused_macros)]
        macro_rules! info {
            ($dol($dol arg:tt)+) => {
                $crate::log::info!(target: $context.get_name(), $dol ($dol arg)+)
            };
        }
        #[allow(unused_macros)]
        macro_rules! warn {
            ($dol ($dol arg:tt)+) => {
                $crate::log::warn!(target: $context.get_name(), $dol ($dol arg)+)
            };
        }
        #[allow(unused_macros)]
        macro_rules! error {
            ($dol ($dol arg:tt)+) => {
                $crate::log::error!(target: $context.get_name(), $dol ($dol arg)+)
            };
        }
        #[allow(unused_macros)]
        macro_rules! debug {
            ($dol ($dol arg:tt)+) => {
                $crate::log::debug!(target: $context.get_name(), $dol ($dol arg)+)
            };
        }
    };
}

pub(crate) static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Initializes the logging implementation.
///
/// Called automatically by `start_runtime`. Console output is colored
/// and filtered to info and above; the `.log` file under the given
/// directory receives everything down to debug.
pub(crate) fn init_logger(log_path: &Path) -> anyhow::Result<()> {
    let colors = ColoredLevelConfig::new()
        .warn(Color::Yellow)
        .error(Color::Red)
        .trace(Color::BrightBlack);

    let _ = START_TIME.set(Instant::now());

    fern::Dispatch::new()
        .level(log::LevelFilter::Debug)
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let secs = START_TIME.get().unwrap().elapsed().as_secs_f32();
                    out.finish(format_args!(
                        "[{:0>1}:{:.2} {} {}] {}",
                        (secs / 60.0).floor(),
                        secs % 60.0,
                        record.level(),
                        record.target(),
                        message
                    ));
                })
                .chain(
                    fern::log_file(log_path.join(".log"))
                        .context("Failed to create log file. Do we have permissions?")?,
                ),
        )
        .chain(
            fern::Dispatch::new()
                .level(log::LevelFilter::Info)
                .format(move |out, message, record| {
                    let secs = START_TIME.get().unwrap().elapsed().as_secs_f32();
                    out.finish(format_args!(
                        "\x1B[{}m[{:0>1}:{:.2} {}] {}\x1B[0m",
                        colors.get_color(&record.level()).to_fg_str(),
                        (secs / 60.0).floor(),
                        secs % 60.0,
                        record.target(),
                        message
                    ));
                })
                .chain(std::io::stdout()),
        )
        .apply()
        .context("Logger should have initialized correctly")?;

    Ok(())
}
