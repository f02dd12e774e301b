//! ffprobe logic
use anyhow::{Context, anyhow, ensure};
use std::{fmt, path::Path, time::Duration};

#[derive(Debug, Clone)]
pub struct Ffprobe {
    /// Duration of the input, always > 0.
    pub duration: Duration,
    /// The input has audio stream(s).
    pub has_audio: bool,
}

/// Probe the given input for its duration & audio presence.
pub fn probe(input: &Path) -> Result<Ffprobe, ProbeError> {
    let probe = ffprobe::ffprobe(input).map_err(|err| ProbeError(format!("ffprobe: {err}")))?;

    let duration = read_duration(&probe)?;
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(Ffprobe {
        duration,
        has_audio,
    })
}

fn read_duration(probe: &ffprobe::FfProbe) -> anyhow::Result<Duration> {
    let duration_s = probe
        .format
        .duration
        .as_deref()
        .context("ffprobe reported no duration")?;
    parse_duration(duration_s)
}

/// Parse ffprobe's float seconds string, e.g. "12.345000".
pub fn parse_duration(duration_s: &str) -> anyhow::Result<Duration> {
    let duration_f = duration_s
        .trim()
        .parse::<f64>()
        .with_context(|| format!("invalid ffprobe duration: {duration_s:?}"))?;
    let duration = Duration::try_from_secs_f64(duration_f)
        .map_err(|e| anyhow!("{e}: ffprobe duration: {duration_s:?}"))?;
    ensure!(!duration.is_zero(), "zero ffprobe duration");
    Ok(duration)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeError(String);

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<anyhow::Error> for ProbeError {
    fn from(err: anyhow::Error) -> Self {
        Self(format!("{err}"))
    }
}

impl std::error::Error for ProbeError {}

#[test]
fn parse_ffprobe_duration() {
    assert_eq!(
        parse_duration("12.500000").unwrap(),
        Duration::from_millis(12_500)
    );
    assert_eq!(parse_duration("100\n").unwrap(), Duration::from_secs(100));
}

#[test]
fn parse_ffprobe_duration_invalid() {
    assert!(parse_duration("N/A").is_err());
    assert!(parse_duration("-1.0").is_err());
    assert!(parse_duration("0.000000").is_err());
    assert!(parse_duration("inf").is_err());
}

#[test]
fn probe_missing_file() {
    let err = probe(Path::new("/definitely/not/a/real/input.mp4")).unwrap_err();
    assert!(err.to_string().starts_with("ffprobe"), "{err}");
}
