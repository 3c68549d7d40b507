//! Newline framing for the child's stdout.
//!
//! Reads arrive in arbitrary chunks. A line is only handed out once its
//! terminating `\n` has been seen; the unterminated tail is kept for the
//! next chunk.

#[derive(Debug, Default)]
pub struct LineBuffer {
    tail: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, without the
    /// trailing `\n` / `\r\n`. Blank lines are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.tail.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.tail[start..].iter().position(|b| *b == b'\n') {
            let end = start + pos;
            let raw = &self.tail[start..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if !raw.iter().all(u8::is_ascii_whitespace) {
                lines.push(String::from_utf8_lossy(raw).into_owned());
            }
            start = end + 1;
        }
        self.tail.drain(..start);
        lines
    }

    /// Bytes held back waiting for a newline.
    pub fn pending_bytes(&self) -> usize {
        self.tail.len()
    }
}
