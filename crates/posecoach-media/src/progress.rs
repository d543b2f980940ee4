//! Parsing of FFmpeg's `-progress` key/value stream.

/// Snapshot of an encode in flight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    /// Frames written so far
    pub frame: u64,
    /// Output position in milliseconds
    pub out_time_ms: i64,
    /// Multiple of realtime
    pub speed: Option<f64>,
    pub finished: bool,
}

impl FfmpegProgress {
    /// Share of `total_frames` written, in percent.
    pub fn frame_percentage(&self, total_frames: u64) -> f64 {
        if total_frames == 0 {
            return 0.0;
        }
        (self.frame as f64 * 100.0 / total_frames as f64).min(100.0)
    }

    /// Fold one line into `self`. A `progress=` line closes a block and
    /// yields a snapshot.
    pub fn apply_line(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();
        match key {
            "frame" => self.frame = value.parse().unwrap_or(self.frame),
            // both keys carry microseconds
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.speed = Some(speed);
                }
            }
            "progress" => {
                self.finished = value == "end";
                return Some(self.clone());
            }
            _ => {}
        }
        None
    }
}

/// Whether `line` belongs to the `-progress` stream rather than a log line.
pub fn is_progress_line(line: &str) -> bool {
    line.trim()
        .split_once('=')
        .map(|(key, _)| !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(false)
}
