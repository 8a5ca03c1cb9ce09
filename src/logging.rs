//! Matches the teacher's uniform `env_logger::init()` convention across
//! its binaries, extended with a `--debug` override (spec §6).

use std::path::Path;

use env_logger::Builder;
use log::LevelFilter;

pub fn init(debug: bool, log_path: &Path) {
    let mut builder = Builder::from_default_env();
    if debug {
        builder.filter_level(LevelFilter::Debug);
    } else {
        builder.filter_level(LevelFilter::Info);
    }

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(log_path) {
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    // Re-initializing in test binaries (one process, many #[test] fns) is
    // expected to fail after the first call; ignore it rather than panic.
    let _ = builder.try_init();
}
