//! FFmpeg `-progress` snapshots.

/// State at the end of one `-progress` block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FfmpegProgress {
    /// Output timestamp reached, in milliseconds
    pub out_time_ms: i64,
    /// Set on the final block (`progress=end`)
    pub finished: bool,
}

impl FfmpegProgress {
    /// Whole percent of `total_ms` reached, clamped to 0..=100.
    /// An unknown total (`<= 0`) reads as 0.
    pub fn percent(&self, total_ms: i64) -> u8 {
        if total_ms <= 0 {
            return 0;
        }
        let ratio = self.out_time_ms.max(0) as f64 / total_ms as f64;
        (ratio * 100.0).clamp(0.0, 100.0) as u8
    }

    /// Fold one `key=value` line into the running state.
    ///
    /// Returns a snapshot when the line closes a block.
    pub(crate) fn apply(&mut self, key: &str, value: &str) -> Option<FfmpegProgress> {
        match key {
            // Both keys carry microseconds in current FFmpeg releases
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
                None
            }
            "progress" => {
                self.finished = value == "end";
                Some(*self)
            }
            _ => None,
        }
    }
}
