use std::time::Duration;

use super::queue::format_duration_short;
use crate::sources::Track;

const BAR_CELLS: usize = 30;

/// What is playing right now, ready to be rendered.
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub track: Track,
    pub position: Duration,
    pub total: Duration,
    /// Tracks queued after this one.
    pub remaining_tracks: usize,
    pub remaining_duration: Duration,
}

impl NowPlaying {
    /// `1:05  -----●------------------------  3:20`
    pub fn progress_bar(&self) -> String {
        progress_bar(self.position, self.total)
    }

    /// Counts only the tracks after the one playing.
    pub fn queue_summary(&self) -> String {
        format!(
            "{} tracks left in queue - {}",
            self.remaining_tracks,
            format_duration_short(self.remaining_duration)
        )
    }
}

pub fn progress_bar(position: Duration, total: Duration) -> String {
    let cell = if total.is_zero() {
        0
    } else {
        let percent = (position.as_millis() * 100 / total.as_millis()) as usize;
        (percent * BAR_CELLS / 100).min(BAR_CELLS - 1)
    };

    let bar: String = (0..BAR_CELLS)
        .map(|i| if i == cell { '●' } else { '-' })
        .collect();

    format!("{}  {}  {}", clock(position), bar, clock(total))
}

/// `m:ss`, or `h:mm:ss` past the hour. Rounds to the nearest second.
pub fn clock(duration: Duration) -> String {
    let secs = (duration.as_millis() + 500) / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clock() {
        assert_eq!(clock(Duration::ZERO), "0:00");
        assert_eq!(clock(Duration::from_millis(65_600)), "1:06");
        assert_eq!(clock(Duration::from_secs(3 * 3600 + 7)), "3:00:07");
    }

    #[test]
    fn test_progress_bar_positions_marker() {
        let bar = progress_bar(Duration::from_secs(50), Duration::from_secs(100));
        assert_eq!(bar, format!("0:50  {}●{}  1:40", "-".repeat(15), "-".repeat(14)));

        let start = progress_bar(Duration::ZERO, Duration::from_secs(100));
        assert!(start.contains(&format!("●{}", "-".repeat(29))));
    }

    #[test]
    fn test_progress_bar_clamps_and_handles_unknown_length() {
        let past_end = progress_bar(Duration::from_secs(200), Duration::from_secs(100));
        assert!(past_end.contains(&format!("{}●", "-".repeat(29))));

        let unknown = progress_bar(Duration::from_secs(10), Duration::ZERO);
        assert!(unknown.starts_with("0:10  ●"));
    }

    #[test]
    fn test_queue_summary_leaves_out_the_current_track() {
        use crate::sources::{DirectTrack, Requester, TrackMetadata};
        use serenity::model::id::UserId;

        let meta = TrackMetadata::new(
            "A".to_string(),
            "https://example.com/a".to_string(),
            Requester::new(UserId::new(1), "tester"),
        );
        let now = NowPlaying {
            track: DirectTrack::from_metadata("https://example.com/a.mp3".to_string(), meta).into(),
            position: Duration::ZERO,
            total: Duration::from_secs(60),
            remaining_tracks: 2,
            remaining_duration: Duration::from_secs(3720),
        };

        assert_eq!(now.queue_summary(), "2 tracks left in queue - 1h 2m");
    }
}
