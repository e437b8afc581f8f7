use bytes::BytesMut;

/// Splits an accumulating byte stream into newline-delimited frames.
///
/// The trailing partial line is carried until the next chunk arrives, so the
/// frames produced are identical however the input is chunked. Decoding is
/// lossy on purpose: the feed is JSON and a mangled line gets skipped by the
/// decoder downstream anyway.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: BytesMut,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb a chunk and return every complete frame it unlocked.
    /// Frames do not include the terminating newline; blank frames are
    /// returned as-is and left for the caller to skip.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos);
            let _ = self.buf.split_to(1); // drop '\n'
            frames.push(String::from_utf8_lossy(&line).into_owned());
        }
        frames
    }

    /// Bytes buffered past the last newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
