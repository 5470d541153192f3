// Logger setup. RUST_LOG overrides the default filter in every mode.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use env_logger::{Builder, Env, Target};

const DEFAULT_FILTER: &str = "warn";

fn builder() -> Builder {
    Builder::from_env(Env::default().default_filter_or(DEFAULT_FILTER))
}

/// Logs to stderr; stdout stays free for command output and RPC replies.
pub fn init_stderr() {
    builder().target(Target::Stderr).init();
}

pub fn log_file_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("svcm").join("svcm.log"))
}

/// Logs to a file while the dashboard owns the terminal.
///
/// Logging stays off if the file cannot be opened.
pub fn init_file() {
    let Some(path) = log_file_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("svcm: logging disabled: {}: {}", parent.display(), e);
            return;
        }
    }

    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => builder().target(Target::Pipe(Box::new(file))).init(),
        Err(e) => eprintln!("svcm: logging disabled: {}: {}", path.display(), e),
    }
}
