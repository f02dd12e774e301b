//! Target size -> bitrate logic
use std::{fmt, time::Duration};

/// Bytes per "MB" of `--max_size_mb`.
pub const BYTES_PER_MB: f64 = 1_000_000.0;

/// Video & audio bitrates, in bits per second, that fit a target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitratePlan {
    pub video: u64,
    pub audio: u64,
    /// Video bitrate was raised to the minimum viable bitrate,
    /// so the output will likely exceed the target size.
    pub clamped: bool,
}

impl BitratePlan {
    /// Calculate the bitrate split for a `size_bytes` output of `duration`.
    ///
    /// The total is `floor(size_bytes * 8 / duration)`, `audio_bitrate` is reserved
    /// from that & the rest goes to video, raised to at least `min_video_bitrate`.
    /// Since the total is floored, the planned size falls short of `size_bytes` by
    /// less than `duration / 8` bytes when not clamped.
    pub fn calculate(
        size_bytes: u64,
        duration: Duration,
        audio_bitrate: u64,
        min_video_bitrate: u64,
    ) -> Result<Self, InfeasibleSize> {
        let infeasible = InfeasibleSize {
            size_bytes,
            duration,
            audio_bitrate,
        };
        let secs = duration.as_secs_f64();
        if secs <= 0.0 {
            return Err(infeasible);
        }

        let total = (size_bytes as f64 * 8.0 / secs).floor() as u64;
        let video = match total.checked_sub(audio_bitrate) {
            Some(v) if v > 0 => v,
            _ => return Err(infeasible),
        };

        Ok(Self {
            video: video.max(min_video_bitrate),
            audio: audio_bitrate,
            clamped: video < min_video_bitrate,
        })
    }

    pub fn total(&self) -> u64 {
        self.video.saturating_add(self.audio)
    }

    /// Predicted output size ignoring container overhead.
    pub fn predicted_size(&self, duration: Duration) -> f64 {
        self.total() as f64 * duration.as_secs_f64() / 8.0
    }
}

/// Target size too small to fit the audio reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfeasibleSize {
    pub size_bytes: u64,
    pub duration: Duration,
    pub audio_bitrate: u64,
}

impl fmt::Display for InfeasibleSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "target size {} bytes is too small for {:.2}s with {} bps audio",
            self.size_bytes,
            self.duration.as_secs_f64(),
            self.audio_bitrate,
        )
    }
}

impl std::error::Error for InfeasibleSize {}

/// Convert a `--max_size_mb` value into bytes.
pub fn mb_to_bytes(mb: f64) -> u64 {
    (mb * BYTES_PER_MB).round() as u64
}
