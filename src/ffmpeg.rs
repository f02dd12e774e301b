//! ffmpeg encoding logic
use crate::{
    bitrate::BitratePlan,
    process::{self, CommandExt, child::KillOnDropLineStream},
};
use anyhow::Context;
use std::{
    collections::HashSet,
    io,
    num::NonZeroUsize,
    path::Path,
    process::{ExitStatus, Stdio},
    time::Duration,
};
use tokio::process::Command;
use tokio_process_stream::{Item, ProcessLineStream};
use tokio_stream::{Stream, StreamExt};

/// Exposed ffmpeg encoding args.
#[derive(Debug, Clone)]
pub struct FfmpegEncodeArgs<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub plan: BitratePlan,
    /// `-threads` limit, ffmpeg decides when `None`.
    pub threads: Option<NonZeroUsize>,
    /// Appended verbatim after all computed args, so they take precedence.
    pub extra_args: &'a [String],
}

/// Build the single-pass average bitrate encode command.
///
/// Status is written to stdout with `-progress pipe:1`, stderr carries ffmpeg's log.
pub fn encode_command(
    ffmpeg: &Path,
    FfmpegEncodeArgs {
        input,
        output,
        plan,
        threads,
        extra_args,
    }: FfmpegEncodeArgs,
) -> Command {
    let oargs: HashSet<_> = extra_args.iter().map(|a| a.as_str()).collect();
    let output_ext = output.extension().and_then(|e| e.to_str());
    let add_faststart =
        matches!(output_ext, Some("mp4" | "mov" | "m4v")) && !oargs.contains("-movflags");
    let video = plan.video.to_string();

    let mut enc = Command::new(ffmpeg);
    enc.kill_on_drop(true)
        .arg("-hide_banner")
        .arg("-y")
        .arg("-nostdin")
        .arg2("-i", input)
        .arg2("-b:v", &video)
        .arg2("-maxrate", &video)
        .arg2("-bufsize", plan.video.saturating_mul(2).to_string())
        .arg2_if(plan.audio > 0, "-b:a", plan.audio.to_string())
        .arg2_opt("-threads", threads.map(|t| t.to_string()))
        .arg2_if(add_faststart, "-movflags", "+faststart")
        .arg2("-progress", "pipe:1")
        .arg("-nostats")
        .args(extra_args)
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    enc
}

/// Spawn an encode command built by [`encode_command`].
///
/// Dropping the returned stream before it finishes kills ffmpeg.
pub fn encode(
    mut enc: Command,
) -> anyhow::Result<impl Stream<Item = FfmpegOut> + Unpin> {
    let program = enc.as_std().get_program().to_string_lossy().into_owned();
    let child = enc.spawn().with_context(|| format!("spawn {program}"))?;
    let stream = KillOnDropLineStream::from(ProcessLineStream::from(child));
    Ok(stream.filter_map(FfmpegOut::from_item))
}

#[derive(Debug)]
pub enum FfmpegOut {
    /// Encoded media time so far.
    Progress(Duration),
    Fps(f32),
    /// A line of ffmpeg's log output.
    Stderr(String),
    Done(io::Result<ExitStatus>),
}

impl FfmpegOut {
    fn from_item(item: Item<String>) -> Option<Self> {
        match item {
            Item::Stdout(line) => process::parse_elapsed(&line)
                .map(Self::Progress)
                .or_else(|| process::parse_fps(&line).map(Self::Fps)),
            Item::Stderr(line) => Some(Self::Stderr(line)),
            Item::Done(code) => Some(Self::Done(code)),
        }
    }
}
