use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::config::General;
use crate::errors::ConfigError;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {l} [{M}] {m}{n}";

/// Builds and installs the `log4rs` logger described by `config`. A plain
/// file appender at `log_path`, optionally tee'd to stdout, at the
/// configured level.
pub fn setup_logger(config: &General) -> Result<(), ConfigError> {
    let file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(&config.log_path)?;

    let mut builder = LogConfig::builder().appender(Appender::builder().build("file", Box::new(file)));
    let mut root_builder = Root::builder().appender("file");

    if config.log_to_stdout {
        let stdout = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build();
        builder = builder.appender(Appender::builder().build("stdout", Box::new(stdout)));
        root_builder = root_builder.appender("stdout");
    }

    let log_config = builder.build(root_builder.build(config.log_level))?;
    log4rs::init_config(log_config)?;

    Ok(())
}
