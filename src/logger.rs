use chrono::Local;
use fern::Dispatch;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use std::fs;
use std::path::Path;

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "simulation.log";

/// Initializes the global logger with console output and `logs/simulation.log`.
///
/// Log level is controlled by the `RUST_LOG` environment variable
/// (`RUST_LOG=debug` shows every allocation, `RUST_LOG=trace` every executed event).
/// If `RUST_LOG` is not set, it defaults to `info`.
///
/// Call it once before building a `Simulator`; repeated calls only report
/// that a global logger is already installed.
pub fn init() {
    init_in(Path::new(LOG_DIR));
}

/// Same as [`init`], but writes the log file into `log_dir`.
pub fn init_in(log_dir: &Path) {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let log_level_filter = log_level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);

    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::BrightBlack);

    let console_config = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .chain(std::io::stderr());

    let mut base_config = Dispatch::new().level(log_level_filter).level_for("serde", LevelFilter::Warn).chain(console_config);

    // The file sink is optional, a read-only working directory still gets console logs.
    let log_file_path = log_dir.join(LOG_FILE);
    let file_sink = fs::create_dir_all(log_dir).and_then(|_| fern::log_file(&log_file_path));
    match file_sink {
        Ok(file) => {
            let file_config = Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!("[{} {} {}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), record.level(), record.target(), message))
                })
                .chain(file);
            base_config = base_config.chain(file_config);
        }
        Err(e) => eprintln!("Failed to open log file '{}': {}", log_file_path.display(), e),
    }

    if let Err(e) = base_config.apply() {
        eprintln!("Failed to apply logger configuration: {}", e);
        return;
    }

    log::info!("Logger initialized. Logging to console and '{}'.", log_file_path.display());
}
