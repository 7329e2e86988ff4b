//! FFmpeg `-progress pipe:2` parsing.

/// Encoder progress, accumulated from `key=value` lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    /// Frames written so far
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed relative to realtime
    pub speed: f64,
    /// Set once FFmpeg reports `progress=end`
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fold one line into the running state.
    ///
    /// Returns a snapshot at the end of each progress block, `None` otherwise.
    pub fn apply_line(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            // Despite the name FFmpeg reports microseconds here as well.
            "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                if value == "end" {
                    self.is_complete = true;
                }
                return Some(self.clone());
            }
            _ => {}
        }
        None
    }

    /// True when the line belongs to the progress protocol rather than
    /// FFmpeg's diagnostic output.
    pub fn is_progress_line(line: &str) -> bool {
        match line.split_once('=') {
            Some((key, _)) => {
                !key.is_empty()
                    && key
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            }
            None => false,
        }
    }

    pub fn out_time_secs(&self) -> f64 {
        self.out_time_ms as f64 / 1000.0
    }

    /// Percentage of `total_secs` written so far.
    pub fn percentage(&self, total_secs: f64) -> f64 {
        if total_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_secs() / total_secs * 100.0).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_block() {
        let mut progress = FfmpegProgress::default();
        assert!(progress.apply_line("frame=46").is_none());
        assert!(progress.apply_line("out_time_us=2000000").is_none());
        assert!(progress.apply_line("speed=1.52x").is_none());
        let snapshot = progress.apply_line("progress=continue").unwrap();
        assert_eq!(snapshot.frame, 46);
        assert!((snapshot.percentage(8.0) - 25.0).abs() < 0.01);
        assert!((snapshot.speed - 1.52).abs() < 0.001);
        assert!(!snapshot.is_complete);

        progress.apply_line("speed=N/A");
        assert!((progress.speed - 1.52).abs() < 0.001);
        assert!(progress.apply_line("progress=end").unwrap().is_complete);
    }

    #[test]
    fn test_is_progress_line() {
        assert!(FfmpegProgress::is_progress_line("out_time_us=123"));
        assert!(FfmpegProgress::is_progress_line("stream_0_0_q=28.0"));
        assert!(!FfmpegProgress::is_progress_line("[xfade @ 0x55] First input link main timebase"));
        assert!(!FfmpegProgress::is_progress_line("Error opening input file seg.mp4."));
    }
}
