//! Shared argument logic.
use anyhow::ensure;
use std::{fs, path::Path};

/// Console verbosity, `-v` count capped at 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Verbosity(u8);

impl Verbosity {
    pub const MAX: u8 = 3;

    /// Show the progress bar & final summary.
    pub fn progress(self) -> bool {
        self.0 >= 1
    }

    /// Also print key parameters: duration, bitrates & the ffmpeg command.
    pub fn params(self) -> bool {
        self.0 >= 2
    }

    /// Also mirror every ffmpeg log line.
    pub fn ffmpeg_output(self) -> bool {
        self.0 >= 3
    }
}

impl From<u8> for Verbosity {
    fn from(count: u8) -> Self {
        Self(count.min(Self::MAX))
    }
}

/// Parse a positive, finite `--max_size_mb` value.
pub fn parse_size_mb(arg: &str) -> anyhow::Result<f64> {
    let mb: f64 = arg.trim().parse()?;
    ensure!(mb.is_finite() && mb > 0.0, "must be a positive number of MB");
    Ok(mb)
}

/// Split each `-a` value on whitespace, keeping overall order.
///
/// E.g. `-a "-c:v libx265" -a "-preset slow"` -> `-c:v libx265 -preset slow`.
pub fn split_extra_args(args: &[String]) -> Vec<String> {
    args.iter()
        .flat_map(|a| a.split_whitespace())
        .map(str::to_owned)
        .collect()
}

/// Whether `a` & `b` refer to the same file, resolving links when both exist.
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[test]
fn verbosity_levels() {
    let v0 = Verbosity::from(0);
    assert!(!v0.progress());

    let v2 = Verbosity::from(2);
    assert!(v2.progress() && v2.params() && !v2.ffmpeg_output());

    assert_eq!(Verbosity::from(7), Verbosity::from(3));
    assert!(Verbosity::from(7).ffmpeg_output());
}

#[test]
fn size_mb() {
    assert_eq!(parse_size_mb("10").unwrap(), 10.0);
    assert_eq!(parse_size_mb("0.001").unwrap(), 0.001);
    assert!(parse_size_mb("0").is_err());
    assert!(parse_size_mb("-5").is_err());
    assert!(parse_size_mb("inf").is_err());
    assert!(parse_size_mb("ten").is_err());
}

#[test]
fn extra_args_split() {
    let args = ["-c:v libx265".to_owned(), " -preset  slow ".into(), "-an".into()];
    assert_eq!(
        split_extra_args(&args),
        ["-c:v", "libx265", "-preset", "slow", "-an"]
    );
    assert!(split_extra_args(&[]).is_empty());
}

#[test]
fn same_file_paths() {
    assert!(same_file(Path::new("a/vid.mp4"), Path::new("a/vid.mp4")));
    assert!(!same_file(Path::new("a/vid.mp4"), Path::new("a/vid.small.mp4")));
}
