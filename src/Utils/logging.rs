use log::{LevelFilter, SetLoggerError};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

/// Install a terminal logger for the whole process. Call once, typically at
/// the start of a driver program; repeated calls return an error from the log
/// facade.
pub fn init_console_logging(level: LevelFilter) -> Result<(), SetLoggerError> {
    TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)
}
