use crate::{bitrate::InfeasibleSize, ffprobe::ProbeError};
use std::{fmt, process::ExitCode};

/// Fatal job failure, one variant per failing stage.
#[derive(Debug)]
pub enum Error {
    /// Missing or invalid cli input, no job was started.
    UserInput(anyhow::Error),
    Probe(ProbeError),
    InfeasibleSize(InfeasibleSize),
    /// ffmpeg could not be spawned.
    Launch(anyhow::Error),
    /// ffmpeg ran but failed.
    Encode {
        code: Option<i32>,
        stderr_tail: Vec<String>,
    },
    Interrupted,
}

impl Error {
    pub fn user_input(reason: impl fmt::Display) -> Self {
        Self::UserInput(anyhow::anyhow!("{reason}"))
    }

    pub fn ensure_input(condition: bool, reason: &'static str) -> Result<(), Self> {
        if !condition {
            return Err(Self::user_input(reason));
        }
        Ok(())
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::UserInput(_) => 2,
            Self::Probe(_) => 3,
            Self::InfeasibleSize(_) => 4,
            Self::Launch(_) => 5,
            Self::Encode { .. } => 6,
            Self::Interrupted => 130,
        }
    }
}

impl From<ProbeError> for Error {
    fn from(err: ProbeError) -> Self {
        Self::Probe(err)
    }
}

impl From<InfeasibleSize> for Error {
    fn from(err: InfeasibleSize) -> Self {
        Self::InfeasibleSize(err)
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        ExitCode::from(err.exit_code())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserInput(err) => write!(f, "{err:#}"),
            Self::Probe(err) => write!(f, "probe failed: {err}"),
            Self::InfeasibleSize(err) => err.fmt(f),
            Self::Launch(err) => write!(f, "failed to launch encoder: {err:#}"),
            Self::Encode { code, stderr_tail } => {
                match code {
                    Some(code) => write!(f, "ffmpeg exit code {code}")?,
                    None => write!(f, "ffmpeg exited abnormally")?,
                }
                match stderr_tail.last() {
                    Some(line) => write!(f, ": {line}"),
                    None => Ok(()),
                }
            }
            Self::Interrupted => "interrupted".fmt(f),
        }
    }
}

impl std::error::Error for Error {}

#[test]
fn exit_codes_distinct() {
    use std::{collections::HashSet, time::Duration};

    let errors = [
        Error::user_input("bad"),
        Error::Probe(ProbeError::from(anyhow::anyhow!("nope"))),
        Error::InfeasibleSize(InfeasibleSize {
            size_bytes: 1000,
            duration: Duration::from_secs(100),
            audio_bitrate: 128_000,
        }),
        Error::Launch(anyhow::anyhow!("not found")),
        Error::Encode {
            code: Some(1),
            stderr_tail: vec![],
        },
        Error::Interrupted,
    ];
    let codes: HashSet<_> = errors.iter().map(Error::exit_code).collect();
    assert_eq!(codes.len(), errors.len());
    assert!(!codes.contains(&0));
}

#[test]
fn encode_error_message() {
    let err = Error::Encode {
        code: Some(1),
        stderr_tail: vec!["a".into(), "Unknown encoder 'libfoo'".into()],
    };
    assert_eq!(err.to_string(), "ffmpeg exit code 1: Unknown encoder 'libfoo'");
}
