//! Per-run log file setup.
use log::LevelFilter;
use std::{
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use time::{OffsetDateTime, macros::format_description};

/// Create `dir` if needed & open a new timestamped log file inside it.
pub fn open_log_file(
    dir: &Path,
    now: OffsetDateTime,
) -> Result<(PathBuf, fs::File), LogSetupError> {
    let err = |source| LogSetupError {
        dir: dir.to_owned(),
        source,
    };
    fs::create_dir_all(dir).map_err(err)?;

    let stamp = now
        .format(format_description!("[year][month][day]T[hour][minute][second]Z"))
        .map_err(|e| err(io::Error::other(e)))?;
    let path = dir.join(format!("compress-{stamp}.log"));
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(err)?;
    Ok((path, file))
}

/// Install the global logger writing to `file`, noop if a logger is already installed.
///
/// Records default to `debug`, overridable with `RUST_LOG`. The file is unbuffered
/// so each record is flushed as it is written.
pub fn init(file: fs::File) {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Debug)
        .parse_default_env()
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .try_init()
        .ok();
}

/// Log directory or file could not be created. Non fatal, the job continues without a log file.
#[derive(Debug)]
pub struct LogSetupError {
    pub dir: PathBuf,
    pub source: io::Error,
}

impl fmt::Display for LogSetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot write logs to {}: {}", self.dir.display(), self.source)
    }
}

impl std::error::Error for LogSetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::env;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(format!("compress-test-{name}-{}", fastrand::u64(..)))
    }

    #[test]
    fn creates_dir_and_timestamped_file() {
        let dir = temp_path("logs").join("nested");
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();

        let (path, mut file) = open_log_file(&dir, now).unwrap();
        assert_eq!(path, dir.join("compress-20231114T221320Z.log"));
        writeln!(file, "hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");

        fs::remove_dir_all(dir.parent().unwrap()).unwrap();
    }

    #[test]
    fn unwritable_dir_is_setup_error() {
        // a regular file can't be a parent dir, even for root
        let blocker = temp_path("blocker");
        fs::write(&blocker, b"").unwrap();

        let err = open_log_file(&blocker.join("logs"), OffsetDateTime::now_utc()).unwrap_err();
        assert_eq!(err.dir, blocker.join("logs"));
        assert!(err.to_string().starts_with("cannot write logs to"), "{err}");

        fs::remove_file(blocker).unwrap();
    }
}
