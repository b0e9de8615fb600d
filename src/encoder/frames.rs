use bytes::{Buf, Bytes};
use std::io::{self, Read, Seek, SeekFrom};
use symphonia::core::io::MediaSource;

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u32 = 2;
/// 20 ms of interleaved stereo f32 samples.
pub const FRAME_SIZE: usize = (SAMPLE_RATE as usize / 50) * CHANNELS as usize * 4;

pub type FrameSender = flume::Sender<Bytes>;
pub type FrameReceiver = flume::Receiver<Bytes>;

/// Bounded channel between an encode session and its reader. The bound
/// makes the encoder wait while playback is paused.
pub fn frame_channel(capacity: usize) -> (FrameSender, FrameReceiver) {
    flume::bounded(capacity.max(1))
}

/// Blocking byte reader over a frame channel, handed to the voice driver.
///
/// Reaches end of stream once every sender is gone and the channel is empty.
pub struct FrameReader {
    frames: FrameReceiver,
    pending: Bytes,
}

impl FrameReader {
    pub fn new(frames: FrameReceiver) -> Self {
        Self {
            frames,
            pending: Bytes::new(),
        }
    }
}

impl Read for FrameReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pending.is_empty() {
            match self.frames.recv() {
                Ok(frame) => self.pending = frame,
                Err(flume::RecvError::Disconnected) => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

impl Seek for FrameReader {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "frame stream is not seekable",
        ))
    }
}

impl MediaSource for FrameReader {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size() {
        assert_eq!(FRAME_SIZE, 7680);
    }

    #[test]
    fn test_reader_spans_frames_and_ends_on_disconnect() {
        let (tx, rx) = frame_channel(4);
        tx.send(Bytes::from_static(&[1, 2, 3])).unwrap();
        tx.send(Bytes::from_static(&[4, 5])).unwrap();
        drop(tx);

        let mut reader = FrameReader::new(rx);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
        assert_eq!(reader.read(&mut [0u8; 8]).unwrap(), 0);
    }

    #[test]
    fn test_partial_reads_keep_the_rest() {
        let (tx, rx) = frame_channel(1);
        tx.send(Bytes::from_static(&[9, 8, 7, 6])).unwrap();

        let mut reader = FrameReader::new(rx);
        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [9, 8, 7]);
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 6);
        assert!(!reader.is_seekable());
        assert!(reader.seek(SeekFrom::Start(0)).is_err());
    }

    #[test]
    fn test_two_readers_share_one_channel() {
        let (tx, rx) = frame_channel(4);
        let mut first = FrameReader::new(rx.clone());
        let mut second = FrameReader::new(rx);
        tx.send(Bytes::from_static(&[1])).unwrap();
        tx.send(Bytes::from_static(&[2])).unwrap();

        let mut buf = [0u8; 1];
        first.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1]);
        second.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [2]);
    }
}
