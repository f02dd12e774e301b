pub mod child;

use std::{collections::VecDeque, ffi::OsStr, time::Duration};

/// Parse the encoded ("elapsed") media time from an ffmpeg status line.
///
/// Recognises `-progress` output, `out_time_us=1500000`, `out_time_ms=1500000`
/// (also microseconds) & `out_time=00:00:01.500000`, as well as the classic
/// `frame=  288 fps= 94 .. time=00:00:01.50 ..` stats line.
pub fn parse_elapsed(line: &str) -> Option<Duration> {
    let line = line.trim();
    if let Some(us) = line
        .strip_prefix("out_time_us=")
        .or_else(|| line.strip_prefix("out_time_ms="))
    {
        return us.parse::<u64>().ok().map(Duration::from_micros);
    }
    if let Some(hms) = line.strip_prefix("out_time=") {
        return parse_hms(hms);
    }
    if line.starts_with("frame=") {
        return parse_hms(parse_label_substr("time=", line)?);
    }
    None
}

/// Parse the encoding speed from an ffmpeg status line, `fps=94.5`.
pub fn parse_fps(line: &str) -> Option<f32> {
    let line = line.trim();
    let fps = match line.strip_prefix("fps=") {
        Some(fps) => fps,
        None if line.starts_with("frame=") => parse_label_substr("fps=", line)?,
        None => return None,
    };
    fps.trim().parse().ok().filter(|f: &f32| f.is_finite())
}

/// Parse `HH:MM:SS.fff`, rejecting negative times ffmpeg may emit before the first frame.
fn parse_hms(hms: &str) -> Option<Duration> {
    let mut parts = hms.trim().splitn(3, ':');
    let h: u64 = parts.next()?.parse().ok()?;
    let m: u64 = parts.next()?.parse().ok()?;
    let secs = parts.next()?;
    let (s, frac) = secs.split_once('.').unwrap_or((secs, ""));
    let s: u64 = s.parse().ok()?;
    let secs = h
        .checked_mul(60 * 60)?
        .checked_add(m.checked_mul(60)?)?
        .checked_add(s)?;
    Some(Duration::new(secs, parse_nanos(frac)?))
}

/// Parse decimal fraction digits, e.g. "34" -> 340_000_000.
fn parse_nanos(frac: &str) -> Option<u32> {
    if frac.is_empty() {
        return Some(0);
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = &frac[..frac.len().min(9)];
    let n: u32 = digits.parse().ok()?;
    Some(n * 10_u32.pow(9 - digits.len() as u32))
}

/// Parse a ffmpeg `label=  value ` type substring.
fn parse_label_substr<'a>(label: &str, line: &'a str) -> Option<&'a str> {
    let line = &line[line.find(label)? + label.len()..];
    let val_start = line.char_indices().find(|(_, c)| !c.is_whitespace())?.0;
    let val_end = val_start
        + line[val_start..]
            .char_indices()
            .find(|(_, c)| c.is_whitespace())
            .map(|(idx, _)| idx)
            .unwrap_or_else(|| line[val_start..].len());

    Some(&line[val_start..val_end])
}

/// Keeps the last `N` lines of a process' stderr.
#[derive(Debug, Default)]
pub struct Tail<const N: usize>(VecDeque<String>);

impl<const N: usize> Tail<N> {
    pub fn push(&mut self, line: String) {
        if self.0.len() == N {
            self.0.pop_front();
        }
        self.0.push_back(line);
    }

    pub fn into_lines(self) -> Vec<String> {
        self.0.into()
    }
}

pub trait CommandExt {
    /// Adds two arguments.
    fn arg2(&mut self, a: impl AsRef<OsStr>, b: impl AsRef<OsStr>) -> &mut Self;

    /// Adds two arguments, the 2nd an option. `None` mean noop.
    fn arg2_opt(&mut self, a: impl AsRef<OsStr>, b: Option<impl AsRef<OsStr>>) -> &mut Self;

    /// Adds two arguments if `condition` otherwise noop.
    fn arg2_if(&mut self, condition: bool, a: impl AsRef<OsStr>, b: impl AsRef<OsStr>)
    -> &mut Self;
}
impl CommandExt for tokio::process::Command {
    fn arg2(&mut self, a: impl AsRef<OsStr>, b: impl AsRef<OsStr>) -> &mut Self {
        self.arg(a).arg(b)
    }

    fn arg2_opt(&mut self, a: impl AsRef<OsStr>, b: Option<impl AsRef<OsStr>>) -> &mut Self {
        match b {
            Some(b) => self.arg2(a, b),
            None => self,
        }
    }

    fn arg2_if(&mut self, c: bool, a: impl AsRef<OsStr>, b: impl AsRef<OsStr>) -> &mut Self {
        match c {
            true => self.arg2(a, b),
            false => self,
        }
    }
}

/// Render a command as a copy-pasteable shell line.
pub fn shell_line(cmd: &tokio::process::Command) -> String {
    let cmd = cmd.as_std();
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|a| shell_escape::escape(a.to_string_lossy()).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_progress_out_time_us() {
        assert_eq!(
            parse_elapsed("out_time_us=83123400"),
            Some(Duration::from_micros(83_123_400))
        );
        assert_eq!(
            parse_elapsed("out_time_ms=1500000\n"),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn parse_progress_out_time() {
        assert_eq!(
            parse_elapsed("out_time=01:23:12.340000"),
            Some(Duration::from_millis((60 * 60 + 23 * 60 + 12) * 1000 + 340))
        );
        assert_eq!(parse_elapsed("out_time=00:00:05"), Some(Duration::from_secs(5)));
    }

    #[test]
    fn parse_progress_unknown_values() {
        assert_eq!(parse_elapsed("out_time_us=N/A"), None);
        assert_eq!(parse_elapsed("out_time=N/A"), None);
        assert_eq!(parse_elapsed("out_time_us=-9223372036854775807"), None);
        assert_eq!(parse_elapsed("out_time=-577014:32:22.775808"), None);
    }

    #[test]
    fn parse_progress_overflowing_time() {
        assert_eq!(parse_elapsed("out_time=9999999999999999:00:00.0"), None);
        assert_eq!(parse_elapsed("out_time=0:9999999999999999999:00.0"), None);
        assert_eq!(parse_elapsed("out_time_us=99999999999999999999999"), None);
        let stats = "frame=1 fps=1 time=9999999999999999:00:00.00 speed=1x";
        assert_eq!(parse_elapsed(stats), None);
    }

    #[test]
    fn parse_ffmpeg_stats_line() {
        let out = "frame=  288 fps= 94 q=-0.0 size=N/A time=01:23:12.34 bitrate=N/A speed=3.94x    \r";
        assert_eq!(
            parse_elapsed(out),
            Some(Duration::new(60 * 60 + 23 * 60 + 12, 340_000_000))
        );
        assert_eq!(parse_fps(out), Some(94.0));
    }

    #[test]
    fn parse_ignores_other_lines() {
        for line in [
            "",
            "progress=continue",
            "bitrate= 672.1kbits/s",
            "total_size=1048576",
            "  Stream #0:0: Video: h264 (High), yuv420p, 1920x1080",
            "speed=3.94x",
        ] {
            assert_eq!(parse_elapsed(line), None, "{line:?}");
            assert_eq!(parse_fps(line), None, "{line:?}");
        }
    }

    #[test]
    fn parse_progress_fps() {
        assert_eq!(parse_fps("fps=59.94"), Some(59.94));
        assert_eq!(parse_fps("fps=0.00"), Some(0.0));
        assert_eq!(parse_fps("fps=N/A"), None);
    }

    #[test]
    fn tail_keeps_last() {
        let mut tail = Tail::<2>::default();
        for l in ["a", "b", "c"] {
            tail.push(l.into());
        }
        assert_eq!(tail.into_lines(), ["b", "c"]);
    }

    #[test]
    fn shell_line_escapes() {
        let mut cmd = tokio::process::Command::new("ffmpeg");
        cmd.arg2("-i", "my video.mp4");
        assert_eq!(shell_line(&cmd), "ffmpeg -i 'my video.mp4'");
    }
}
