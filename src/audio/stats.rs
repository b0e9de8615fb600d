use std::time::Duration;

use crate::encoder::EncodeStats;

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 300.0;
const CHART_PADDING: f64 = 40.0;

/// Stream and encoding statistics of the track being played.
///
/// Allocated when a stream starts and dropped when it ends. Written only by
/// the playback loop's periodic tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub playback_position: Duration,
    /// How much audio the encoder produced so far.
    pub duration: Duration,
    pub size_kb: u64,
    /// kbit/s
    pub bitrate: f32,
    pub speed: f32,
    /// Encoded seconds at each sample.
    pub time_axis: Vec<f64>,
    pub bitrate_axis: Vec<f64>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot from the live session and appends a time-series
    /// sample.
    pub fn record(&mut self, playback_position: Duration, encode: EncodeStats) {
        self.playback_position = playback_position;
        self.duration = encode.duration;
        self.size_kb = encode.size_kb;
        self.bitrate = encode.bitrate;
        self.speed = encode.speed;
        self.time_axis.push(encode.duration.as_secs_f64());
        self.bitrate_axis.push(f64::from(encode.bitrate));
    }

    pub fn samples(&self) -> usize {
        self.time_axis.len()
    }

    /// Label/value pairs ready to be shown to users.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Playback", humantime::format_duration(whole_millis(self.playback_position)).to_string()),
            ("Encoded", humantime::format_duration(whole_millis(self.duration)).to_string()),
            ("Size", format!("{:5} kB", self.size_kb)),
            ("Bitrate", format!("{:6.2} kbit/s", self.bitrate)),
            ("Speed", format!("{:5.1}x", self.speed)),
        ]
    }

    /// SVG line chart of the bitrate over the encoding session. Needs at
    /// least two samples.
    pub fn bitrate_chart(&self) -> Option<String> {
        if self.samples() < 2 {
            return None;
        }

        let t_min = self.time_axis.iter().copied().fold(f64::INFINITY, f64::min);
        let t_max = self.time_axis.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let b_max = self
            .bitrate_axis
            .iter()
            .copied()
            .fold(0.0_f64, f64::max)
            .max(1.0);

        let plot_w = CHART_WIDTH - 2.0 * CHART_PADDING;
        let plot_h = CHART_HEIGHT - 2.0 * CHART_PADDING;
        let last = (self.samples() - 1) as f64;

        let points = self
            .time_axis
            .iter()
            .zip(&self.bitrate_axis)
            .enumerate()
            .map(|(i, (t, b))| {
                let ratio = if t_max > t_min {
                    (t - t_min) / (t_max - t_min)
                } else {
                    i as f64 / last
                };
                let x = CHART_PADDING + ratio * plot_w;
                let y = CHART_HEIGHT - CHART_PADDING - (b / b_max) * plot_h;
                format!("{x:.1},{y:.1}")
            })
            .collect::<Vec<_>>()
            .join(" ");

        Some(format!(
            concat!(
                "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">",
                "<rect width=\"100%\" height=\"100%\" fill=\"white\"/>",
                "<line x1=\"{p}\" y1=\"{base}\" x2=\"{right}\" y2=\"{base}\" stroke=\"#999\"/>",
                "<line x1=\"{p}\" y1=\"{p}\" x2=\"{p}\" y2=\"{base}\" stroke=\"#999\"/>",
                "<text x=\"{p}\" y=\"{label}\" font-size=\"12\">{max:.0} kbit/s</text>",
                "<polyline fill=\"none\" stroke=\"#ff5500\" stroke-width=\"2\" points=\"{points}\"/>",
                "</svg>"
            ),
            w = CHART_WIDTH,
            h = CHART_HEIGHT,
            p = CHART_PADDING,
            base = CHART_HEIGHT - CHART_PADDING,
            right = CHART_WIDTH - CHART_PADDING,
            label = CHART_PADDING - 8.0,
            max = b_max,
            points = points,
        ))
    }
}

fn whole_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn encode(secs: u64, bitrate: f32) -> EncodeStats {
        EncodeStats {
            duration: Duration::from_secs(secs),
            size_kb: secs * 16,
            bitrate,
            speed: 2.0,
        }
    }

    #[test]
    fn test_record_updates_snapshot_and_series() {
        let mut stats = Stats::new();
        stats.record(Duration::from_secs(4), encode(10, 128.0));
        stats.record(Duration::from_secs(9), encode(20, 130.5));

        assert_eq!(stats.playback_position, Duration::from_secs(9));
        assert_eq!(stats.duration, Duration::from_secs(20));
        assert_eq!(stats.size_kb, 320);
        assert_eq!(stats.time_axis, vec![10.0, 20.0]);
        assert_eq!(stats.bitrate_axis, vec![128.0, 130.5]);
    }

    #[test]
    fn test_chart_requires_two_samples() {
        let mut stats = Stats::new();
        assert!(stats.bitrate_chart().is_none());
        stats.record(Duration::ZERO, encode(5, 100.0));
        assert!(stats.bitrate_chart().is_none());
        stats.record(Duration::ZERO, encode(10, 120.0));

        let svg = stats.bitrate_chart().unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("points=\"40.0,76.7 760.0,40.0\""));
    }

    #[test]
    fn test_fields() {
        let mut stats = Stats::new();
        stats.record(Duration::from_secs(61), encode(90, 128.0));
        let fields = stats.fields();
        assert_eq!(fields[0], ("Playback", "1m 1s".to_string()));
        assert_eq!(fields[2], ("Size", " 1440 kB".to_string()));
        assert_eq!(fields[4], ("Speed", "  2.0x".to_string()));
    }
}
