use crate::{
    bitrate::{self, BitratePlan},
    command::{
        PROGRESS_CHARS, SmallDuration,
        args::{self, Verbosity},
    },
    error::Error,
    ffmpeg::{self, FfmpegEncodeArgs, FfmpegOut},
    ffprobe::{self, Ffprobe, ProbeError},
    logger,
    process::{self, Tail},
    progress::{ProgressLogger, ProgressState},
};
use clap::{ArgAction, Parser};
use console::style;
use indicatif::{HumanBytes, HumanDuration, ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::{
    io,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tokio::fs;
use tokio_stream::StreamExt;

/// Percent of progress between progress log file entries.
const LOG_PROGRESS_PCT: f64 = 10.0;
/// Number of trailing ffmpeg log lines kept for error reports.
const STDERR_TAIL: usize = 20;

/// Shrink a video to a maximum file size by re-encoding with ffmpeg
/// at a bitrate calculated from the input duration.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Input video file.
    #[arg(long = "input_file", alias = "input-file")]
    pub input: PathBuf,

    /// Output video file, created or overwritten.
    #[arg(long = "output_file", alias = "output-file")]
    pub output: PathBuf,

    /// Maximum output size in MB (1 MB = 1,000,000 bytes).
    #[arg(long = "max_size_mb", alias = "max-size-mb", value_parser = args::parse_size_mb)]
    pub max_size_mb: f64,

    /// Directory to write the run's log file into, created if absent.
    #[arg(
        long = "log_dir",
        alias = "log-dir",
        env = "COMPRESS_LOG_DIR",
        default_value = "logs"
    )]
    pub log_dir: PathBuf,

    /// Additional ffmpeg output args. Split on whitespace & added after the calculated
    /// args, so they take precedence. E.g. -a "-c:v libx265 -preset slow"
    #[arg(
        short = 'a',
        long = "additional_ffmpeg_args",
        alias = "additional-ffmpeg-args",
        allow_hyphen_values = true
    )]
    pub additional_ffmpeg_args: Vec<String>,

    /// Console verbosity: -v progress, -vv & parameters, -vvv & ffmpeg output.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Limit the threads ffmpeg uses.
    #[arg(long = "cpu_limit", alias = "cpu-limit")]
    pub cpu_limit: Option<NonZeroUsize>,

    /// Audio bitrate (bits/s) reserved from the target size, when the input has audio.
    #[arg(
        long = "audio_bitrate",
        alias = "audio-bitrate",
        env = "COMPRESS_AUDIO_BITRATE",
        default_value_t = 128_000
    )]
    pub audio_bitrate: u64,

    /// Video bitrate (bits/s) never to go below, even if that overshoots the target size.
    #[arg(
        long = "min_video_bitrate",
        alias = "min-video-bitrate",
        env = "COMPRESS_MIN_VIDEO_BITRATE",
        default_value_t = 100_000
    )]
    pub min_video_bitrate: u64,

    /// ffmpeg executable.
    #[arg(long, env = "COMPRESS_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Delete the input file after a successful encode.
    #[arg(long = "remove_original", alias = "remove-original")]
    pub remove_original: bool,
}

pub async fn compress(args: Args) -> Result<(), Error> {
    let verbosity = Verbosity::from(args.verbose);

    match logger::open_log_file(&args.log_dir, time::OffsetDateTime::now_utc()) {
        Ok((path, file)) => {
            logger::init(file);
            if verbosity.params() {
                eprintln!("{}", style(format!("Logging to {}", path.display())).dim());
            }
        }
        Err(err) => eprintln!("{} {err}", style("Warning:").yellow().bold()),
    }

    run(args, verbosity).await
}

pub async fn run(args: Args, verbosity: Verbosity) -> Result<(), Error> {
    let start = Instant::now();
    Error::ensure_input(
        !args::same_file(&args.input, &args.output),
        "input and output must be different files",
    )?;
    info!(
        "compressing {} -> {}, max size {} bytes",
        args.input.display(),
        args.output.display(),
        bitrate::mb_to_bytes(args.max_size_mb)
    );

    let probe = probe(args.input.clone()).await?;
    info!(
        "duration {:.3}s, has audio: {}",
        probe.duration.as_secs_f64(),
        probe.has_audio
    );

    encode(args, probe, verbosity, start).await
}

/// Run ffprobe off the runtime thread, so ctrl-c is still handled while probing.
async fn probe(input: PathBuf) -> Result<Ffprobe, Error> {
    tokio::task::spawn_blocking(move || ffprobe::probe(&input))
        .await
        .map_err(|err| ProbeError::from(anyhow::Error::from(err)))?
        .map_err(Error::from)
}

/// Calculate the bitrate plan for the probed input, then encode.
async fn encode(
    Args {
        input,
        output,
        max_size_mb,
        additional_ffmpeg_args,
        cpu_limit,
        audio_bitrate,
        min_video_bitrate,
        ffmpeg,
        remove_original,
        ..
    }: Args,
    probe: Ffprobe,
    verbosity: Verbosity,
    start: Instant,
) -> Result<(), Error> {
    let size_bytes = bitrate::mb_to_bytes(max_size_mb);
    let extra_args = args::split_extra_args(&additional_ffmpeg_args);

    let audio_bitrate = if probe.has_audio { audio_bitrate } else { 0 };
    let plan =
        BitratePlan::calculate(size_bytes, probe.duration, audio_bitrate, min_video_bitrate)?;
    info!(
        "video bitrate {} bps, audio bitrate {} bps, predicted size {:.0} bytes",
        plan.video,
        plan.audio,
        plan.predicted_size(probe.duration)
    );
    if plan.clamped {
        warn!("video bitrate raised to minimum {min_video_bitrate} bps");
        eprintln!(
            "{} video bitrate raised to minimum {min_video_bitrate} bps, output will likely exceed {}",
            style("Warning:").yellow().bold(),
            HumanBytes(size_bytes),
        );
    }

    let enc = ffmpeg::encode_command(
        &ffmpeg,
        FfmpegEncodeArgs {
            input: &input,
            output: &output,
            plan,
            threads: cpu_limit,
            extra_args: &extra_args,
        },
    );
    let cmd_line = process::shell_line(&enc);
    info!("running {cmd_line}");
    if verbosity.params() {
        for line in [
            format!("Duration {}", HumanDuration(probe.duration)),
            format!("Video {} bps, audio {} bps", plan.video, plan.audio),
            cmd_line.clone(),
        ] {
            eprintln!("{}", style(line).dim());
        }
    }

    let mut enc = ffmpeg::encode(enc).map_err(Error::Launch)?;

    let bar = match verbosity.progress() {
        true => ProgressBar::new(probe.duration.as_micros_u64()),
        false => ProgressBar::hidden(),
    }
    .with_style(progress_style());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar.set_message("encoding, ");

    let mut state = ProgressState::new(probe.duration);
    let mut progress_log = ProgressLogger::new(Instant::now(), LOG_PROGRESS_PCT);
    let mut fps = 0.0;
    let mut stderr = Tail::<STDERR_TAIL>::default();
    let mut status = None;
    while let Some(out) = enc.next().await {
        match out {
            FfmpegOut::Progress(elapsed) => {
                if state.update(elapsed) {
                    bar.set_position(state.elapsed().as_micros_u64());
                    progress_log.update(&state, fps);
                }
            }
            FfmpegOut::Fps(f) => {
                if f > 0.0 {
                    fps = f;
                    bar.set_message(format!("{fps} fps, "));
                }
            }
            FfmpegOut::Stderr(line) => {
                debug!(target: "ffmpeg", "{line}");
                if verbosity.ffmpeg_output() {
                    bar.println(style(&line).dim().to_string());
                }
                stderr.push(line);
            }
            FfmpegOut::Done(code) => status = Some(code),
        }
    }

    let status = status.unwrap_or_else(|| Err(io::Error::other("no exit status")));
    match status {
        Ok(status) if status.success() => bar.finish(),
        Ok(status) => {
            bar.abandon();
            error!("failed command: {cmd_line}");
            return Err(Error::Encode {
                code: status.code(),
                stderr_tail: stderr.into_lines(),
            });
        }
        Err(err) => {
            bar.abandon();
            error!("ffmpeg wait: {err}, command: {cmd_line}");
            return Err(Error::Encode {
                code: None,
                stderr_tail: stderr.into_lines(),
            });
        }
    }

    let took = start.elapsed();
    info!(
        "finished in {}",
        humantime::format_duration(Duration::from_secs(took.as_secs()))
    );
    print_summary(&input, &output, size_bytes, took, verbosity).await;

    if remove_original {
        match fs::remove_file(&input).await {
            Ok(_) => info!("removed {}", input.display()),
            Err(err) => {
                warn!("failed to remove {}: {err}", input.display());
                eprintln!(
                    "{} failed to remove {}: {err}",
                    style("Warning:").yellow().bold(),
                    input.display()
                );
            }
        }
    }
    Ok(())
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(
            "{spinner:.cyan.bold} {elapsed_precise:.bold} {wide_bar:.cyan/blue} \
            ({percent}%, {msg}eta {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(PROGRESS_CHARS)
}

/// Print output size info & warn if over the target size.
async fn print_summary(
    input: &Path,
    output: &Path,
    size_bytes: u64,
    took: Duration,
    verbosity: Verbosity,
) {
    let output_size = match fs::metadata(output).await {
        Ok(m) => m.len(),
        Err(err) => {
            warn!("cannot read output size: {err}");
            return;
        }
    };
    info!("output size {output_size} bytes");

    if output_size > size_bytes {
        warn!("output size {output_size} exceeds target {size_bytes}");
        eprintln!(
            "{} output {} exceeds target {}, try a lower --max_size_mb",
            style("Warning:").yellow().bold(),
            HumanBytes(output_size),
            HumanBytes(size_bytes),
        );
    }

    if !verbosity.progress() {
        return;
    }
    let output_pct = match fs::metadata(input).await {
        Ok(m) if m.len() > 0 => {
            let pct = 100.0 * output_size as f64 / m.len() as f64;
            format!(" ({}%)", pct.round())
        }
        _ => String::new(),
    };
    eprintln!(
        "{} {}{} {} {}",
        style("Encoded").dim(),
        style(HumanBytes(output_size)).dim().bold(),
        style(output_pct).dim().bold(),
        style("taking").dim(),
        style(HumanDuration(took)).dim().bold(),
    );
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("compress").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_minimal() {
        let args = parse(&[
            "--input_file",
            "in.mp4",
            "--output_file",
            "out.mp4",
            "--max_size_mb",
            "10",
        ]);
        assert_eq!(args.input, PathBuf::from("in.mp4"));
        assert_eq!(args.output, PathBuf::from("out.mp4"));
        assert_eq!(args.max_size_mb, 10.0);
        assert_eq!(args.verbose, 0);
        assert!(args.cpu_limit.is_none());
        assert!(args.additional_ffmpeg_args.is_empty());
        assert!(!args.remove_original);
    }

    #[test]
    fn cli_full() {
        let args = parse(&[
            "--input_file",
            "in.mkv",
            "--output_file",
            "out.mp4",
            "--max_size_mb",
            "8.5",
            "--log_dir",
            "/tmp/compress-logs",
            "-a",
            "-c:v libx265",
            "-a",
            "-preset slow",
            "-vvv",
            "--cpu_limit",
            "4",
            "--audio_bitrate",
            "96000",
            "--remove_original",
        ]);
        assert_eq!(args.max_size_mb, 8.5);
        assert_eq!(args.log_dir, PathBuf::from("/tmp/compress-logs"));
        assert_eq!(
            args::split_extra_args(&args.additional_ffmpeg_args),
            ["-c:v", "libx265", "-preset", "slow"]
        );
        assert_eq!(args.verbose, 3);
        assert_eq!(args.cpu_limit, NonZeroUsize::new(4));
        assert_eq!(args.audio_bitrate, 96_000);
        assert!(args.remove_original);
    }

    #[test]
    fn cli_missing_required() {
        let err = Args::try_parse_from(["compress", "--input_file", "in.mp4"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn cli_invalid_values() {
        for bad in [
            ["--max_size_mb", "0"],
            ["--max_size_mb", "-1"],
            ["--cpu_limit", "0"],
        ] {
            let mut args = vec!["compress", "--input_file", "a", "--output_file", "b"];
            if bad[0] != "--max_size_mb" {
                args.extend(["--max_size_mb", "1"]);
            }
            args.extend(bad);
            assert!(Args::try_parse_from(args).is_err(), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn same_input_output_rejected() {
        let args = parse(&[
            "--input_file",
            "vid.mp4",
            "--output_file",
            "vid.mp4",
            "--max_size_mb",
            "10",
        ]);
        let err = run(args, Verbosity::from(0)).await.unwrap_err();
        assert!(matches!(err, Error::UserInput(_)), "{err}");
    }

    const PROBE_100S: Ffprobe = Ffprobe {
        duration: Duration::from_secs(100),
        has_audio: true,
    };

    fn args_with_ffmpeg(max_size_mb: &str, ffmpeg: &str) -> Args {
        parse(&[
            "--input_file",
            "in.mp4",
            "--output_file",
            "out.mp4",
            "--max_size_mb",
            max_size_mb,
            "--ffmpeg",
            ffmpeg,
        ])
    }

    #[tokio::test]
    async fn infeasible_size_stops_before_launch() {
        // launching would fail with Error::Launch
        let args = args_with_ffmpeg("0.001", "compress-test-no-such-ffmpeg");
        let err = encode(args, PROBE_100S, Verbosity::from(0), Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InfeasibleSize(_)), "{err}");
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn feasible_size_reaches_launch() {
        let args = args_with_ffmpeg("10", "compress-test-no-such-ffmpeg");
        let err = encode(args, PROBE_100S, Verbosity::from(0), Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Launch(_)), "{err}");
        assert_eq!(err.exit_code(), 5);
    }

    #[tokio::test]
    async fn silent_input_uses_whole_budget() {
        // with no audio 0.016 MB over 1s is 128kbps, all video
        let args = args_with_ffmpeg("0.016", "compress-test-no-such-ffmpeg");
        let probe = Ffprobe {
            duration: Duration::from_secs(1),
            has_audio: false,
        };
        let err = encode(args, probe, Verbosity::from(0), Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Launch(_)), "{err}");
    }

    #[tokio::test]
    async fn unwritable_log_dir_does_not_stop_job() {
        let blocker = std::env::temp_dir().join(format!(
            "compress-test-log-blocker-{}",
            fastrand::u64(..)
        ));
        std::fs::write(&blocker, b"").unwrap();
        let log_dir = blocker.join("logs");

        let args = parse(&[
            "--input_file",
            "/definitely/not/a/real/input.mp4",
            "--output_file",
            "out.mp4",
            "--max_size_mb",
            "10",
            "--log_dir",
            log_dir.to_str().unwrap(),
        ]);
        // job carried on past log setup to probing
        let err = compress(args).await.unwrap_err();
        assert!(matches!(err, Error::Probe(_)), "{err}");
        assert!(!log_dir.exists());

        std::fs::remove_file(blocker).unwrap();
    }

    #[tokio::test]
    async fn unreadable_input_is_probe_error() {
        let args = parse(&[
            "--input_file",
            "/definitely/not/a/real/input.mp4",
            "--output_file",
            "out.mp4",
            "--max_size_mb",
            "10",
        ]);
        let err = run(args, Verbosity::from(0)).await.unwrap_err();
        assert!(matches!(err, Error::Probe(_)), "{err}");
    }
}
