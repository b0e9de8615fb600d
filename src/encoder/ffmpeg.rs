use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use regex::Regex;
use std::{
    process::Stdio,
    sync::{Arc, LazyLock},
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::{Child, ChildStderr, ChildStdout, Command},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{
    frames::{frame_channel, FrameReceiver, FrameSender, CHANNELS, FRAME_SIZE, SAMPLE_RATE},
    EncodeOptions, EncodeSession, EncodeStats, Encoder,
};
use crate::error::{PlayerError, PlayerResult};

static PROGRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"size=\s*(?P<size>\d+)\s*(?:kB|KiB)\s+time=(?P<h>\d+):(?P<m>\d+):(?P<s>\d+(?:\.\d+)?)\s+bitrate=\s*(?P<bitrate>[\d.]+|N/A)(?:kbits/s)?\s+speed=\s*(?P<speed>[\d.]+|N/A)",
    )
    .expect("progress pattern is valid")
});

/// Transcodes remote audio into raw 48 kHz stereo frames with an ffmpeg
/// child process.
pub struct FfmpegEncoder {
    ffmpeg_path: String,
    frame_buffer: usize,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: impl Into<String>, frame_buffer: usize) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            frame_buffer,
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg", 256)
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn start(&self, url: &str, options: EncodeOptions) -> PlayerResult<Arc<dyn EncodeSession>> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(ffmpeg_args(url, &options))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlayerError::EncodeSession(format!("no se pudo iniciar ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlayerError::EncodeSession("ffmpeg sin stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PlayerError::EncodeSession("ffmpeg sin stderr".into()))?;

        let (tx, rx) = frame_channel(self.frame_buffer);
        let stats = Arc::new(Mutex::new(EncodeStats::default()));
        let token = CancellationToken::new();

        tokio::spawn(pump_frames(stdout, tx, token.clone()));
        tokio::spawn(read_progress(stderr, Arc::clone(&stats), token.clone()));

        info!("🎛️ Sesión de ffmpeg iniciada (volumen {:.2}, {} kbit/s)", options.gain(), options.bitrate);

        Ok(Arc::new(FfmpegSession {
            child: Mutex::new(Some(child)),
            frames: rx,
            stats,
            token,
        }))
    }
}

pub struct FfmpegSession {
    child: Mutex<Option<Child>>,
    frames: FrameReceiver,
    stats: Arc<Mutex<EncodeStats>>,
    token: CancellationToken,
}

impl EncodeSession for FfmpegSession {
    fn frames(&self) -> FrameReceiver {
        self.frames.clone()
    }

    fn stats(&self) -> EncodeStats {
        *self.stats.lock()
    }

    fn stop(&self) {
        if let Some(child) = self.child.lock().as_mut() {
            if let Err(e) = child.start_kill() {
                debug!("ffmpeg ya había terminado: {}", e);
            }
        }
    }

    fn cleanup(&self) {
        self.token.cancel();
        self.stop();
        self.child.lock().take();
    }
}

impl Drop for FfmpegSession {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub fn ffmpeg_args(url: &str, options: &EncodeOptions) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "warning",
        "-stats",
        "-reconnect",
        "1",
        "-reconnect_streamed",
        "1",
        "-reconnect_delay_max",
        "2",
        "-i",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.push(url.to_string());
    args.extend([
        "-vn".to_string(),
        "-af".to_string(),
        format!("volume={:.3}", options.gain()),
        "-f".to_string(),
        "f32le".to_string(),
        "-ar".to_string(),
        SAMPLE_RATE.to_string(),
        "-ac".to_string(),
        CHANNELS.to_string(),
        "pipe:1".to_string(),
    ]);
    args
}

/// Cuts stdout into fixed-size frames. Returns when ffmpeg closes its
/// output, the reader goes away or the session is cancelled.
async fn pump_frames(mut stdout: ChildStdout, frames: FrameSender, token: CancellationToken) {
    let mut buf = BytesMut::with_capacity(FRAME_SIZE * 2);

    loop {
        buf.reserve(FRAME_SIZE);
        let read = tokio::select! {
            _ = token.cancelled() => return,
            read = stdout.read_buf(&mut buf) => read,
        };

        match read {
            Ok(0) => break,
            Ok(_) => {
                while buf.len() >= FRAME_SIZE {
                    let frame = buf.split_to(FRAME_SIZE).freeze();
                    tokio::select! {
                        _ = token.cancelled() => return,
                        sent = frames.send_async(frame) => if sent.is_err() { return },
                    }
                }
            }
            Err(e) => {
                warn!("⚠️ Error leyendo la salida de ffmpeg: {}", e);
                break;
            }
        }
    }

    if !buf.is_empty() {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = frames.send_async(buf.freeze()) => {}
        }
    }
    debug!("ffmpeg terminó de producir audio");
}

/// ffmpeg rewrites its progress line with carriage returns.
async fn read_progress(stderr: ChildStderr, stats: Arc<Mutex<EncodeStats>>, token: CancellationToken) {
    let mut reader = BufReader::new(stderr);
    let mut chunk = Vec::new();

    loop {
        chunk.clear();
        let read = tokio::select! {
            _ = token.cancelled() => return,
            read = reader.read_until(b'\r', &mut chunk) => read,
        };

        match read {
            Ok(0) | Err(_) => return,
            Ok(_) => {
                let text = String::from_utf8_lossy(&chunk);
                for line in text.split(['\r', '\n']) {
                    if let Some(progress) = parse_progress(line) {
                        *stats.lock() = progress;
                    } else if !line.trim().is_empty() {
                        trace!("ffmpeg: {}", line.trim());
                    }
                }
            }
        }
    }
}

/// Parses a `size= time= bitrate= speed=` progress line.
pub fn parse_progress(line: &str) -> Option<EncodeStats> {
    let caps = PROGRESS.captures(line)?;

    let hours: u64 = caps["h"].parse().ok()?;
    let minutes: u64 = caps["m"].parse().ok()?;
    let seconds: f64 = caps["s"].parse().ok()?;

    Some(EncodeStats {
        duration: Duration::from_secs_f64((hours * 3600 + minutes * 60) as f64 + seconds),
        size_kb: caps["size"].parse().ok()?,
        bitrate: caps["bitrate"].parse().unwrap_or(0.0),
        speed: caps["speed"].parse().unwrap_or(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_progress_line() {
        let line = "size=     256KiB time=00:01:16.30 bitrate= 128.6kbits/s speed=32.5x";
        let stats = parse_progress(line).unwrap();
        assert_eq!(stats.size_kb, 256);
        assert_eq!(stats.duration, Duration::from_millis(76_300));
        assert_eq!(stats.bitrate, 128.6);
        assert_eq!(stats.speed, 32.5);
    }

    #[test]
    fn test_parse_progress_with_missing_values() {
        let line = "size=       0kB time=00:00:00.00 bitrate=N/A speed=N/A";
        let stats = parse_progress(line).unwrap();
        assert_eq!(stats.size_kb, 0);
        assert_eq!(stats.bitrate, 0.0);
        assert_eq!(stats.speed, 0.0);
    }

    #[test]
    fn test_parse_ignores_other_output() {
        assert!(parse_progress("Input #0, hls, from 'https://cf-hls-media.sndcdn.com':").is_none());
        assert!(parse_progress("").is_none());
    }

    #[test]
    fn test_args_apply_gain_and_raw_output() {
        let options = EncodeOptions { bitrate: 96, volume: 128 };
        let args = ffmpeg_args("https://example.com/a.mp3", &options);

        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "https://example.com/a.mp3");
        assert!(args.contains(&"volume=0.500".to_string()));
        assert!(args.contains(&"f32le".to_string()));
        assert!(args.contains(&"48000".to_string()));
        assert_eq!(args.last().unwrap(), "pipe:1");
    }
}
