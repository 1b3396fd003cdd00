//! Logging setup, grounded on the teacher's `log4rs`-based logger module.
//!
//! The core only ever calls into the `log` facade; these functions are
//! convenience initializers for binaries/tests that embed the crate.

use std::path::Path;

/// Initializes logging from `log4rs.yaml` in the working directory, if present.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let _ = log4rs::init_file("log4rs.yaml", log4rs::config::Deserializers::default());
    Ok(())
}

/// Initializes logging from a specific config file path.
pub fn init_path(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let _ = log4rs::init_file(path, log4rs::config::Deserializers::default());
    Ok(())
}

/// Initializes a rolling file logger scoped to one archive:
/// `{base_dir}/{archive_name}_logs/{archive_name}.log`.
///
/// # Errors
/// Returns an error if the log directory cannot be created or the logger
/// fails to initialize.
pub fn init_for_archive_in(
    base_dir: &Path,
    archive_name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    use log::LevelFilter;
    use log4rs::append::file::FileAppender;
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;
    use std::fs;

    let mut dir = base_dir.to_path_buf();
    dir.push(format!("{archive_name}_logs"));
    fs::create_dir_all(&dir)?;
    let logfile = dir.join(format!("{archive_name}.log"));
    let encoder = Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}"));
    let file_appender = FileAppender::builder().encoder(encoder).build(logfile)?;
    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(file_appender)))
        .build(Root::builder().appender("file").build(LevelFilter::Debug))?;
    log4rs::init_config(config)?;
    Ok(())
}
