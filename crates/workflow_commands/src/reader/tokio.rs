use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::SplitError;

const CHUNK_SIZE_BYTES: usize = 8192;

/// Splits an async byte source into lines.
///
/// A line ends at LF, CRLF or a bare CR, and the terminator is stripped. A CR
/// immediately followed by LF counts as one terminator even when the two bytes
/// arrive in different reads. Trailing bytes without a terminator are returned
/// as a final line once the source reaches EOF.
///
/// Exceeding `max_line_bytes` or a read failure is fatal: the error is returned
/// once and the splitter yields nothing afterwards.
pub struct AsyncLineSplitter<R: AsyncRead + Unpin> {
    reader: R,
    max_line_bytes: usize,
    buffer: Box<[u8; CHUNK_SIZE_BYTES]>,
    buffer_pos: usize,
    buffer_len: usize,
    current_line: Vec<u8>,
    line_number: usize,
    skip_lf: bool,
    done: bool,
}

impl<R: AsyncRead + Unpin> AsyncLineSplitter<R> {
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader,
            max_line_bytes,
            buffer: Box::new([0u8; CHUNK_SIZE_BYTES]),
            buffer_pos: 0,
            buffer_len: 0,
            current_line: Vec::new(),
            line_number: 0,
            skip_lf: false,
            done: false,
        }
    }

    /// Number of lines produced so far.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Returns the underlying reader. Bytes already buffered are discarded.
    pub fn into_inner(self) -> R {
        self.reader
    }

    pub async fn next_line(&mut self) -> Option<Result<Vec<u8>, SplitError>> {
        if self.done {
            return None;
        }

        loop {
            if self.buffer_pos >= self.buffer_len {
                match self.reader.read(&mut self.buffer[..]).await {
                    Ok(0) => {
                        self.done = true;
                        if self.current_line.is_empty() {
                            return None;
                        }
                        return Some(Ok(self.finish_line()));
                    }
                    Ok(n) => {
                        self.buffer_pos = 0;
                        self.buffer_len = n;
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(source) => {
                        self.done = true;
                        return Some(Err(SplitError::Io {
                            line_number: self.line_number + 1,
                            source,
                        }));
                    }
                }
            }

            if self.skip_lf {
                self.skip_lf = false;
                if self.buffer[self.buffer_pos] == b'\n' {
                    self.buffer_pos += 1;
                    continue;
                }
            }

            let slice = &self.buffer[self.buffer_pos..self.buffer_len];
            let Some(idx) = slice.iter().position(|b| *b == b'\n' || *b == b'\r') else {
                let slice_len = slice.len();
                if let Err(err) = self.append(self.buffer_pos, slice_len) {
                    return Some(Err(err));
                }
                self.buffer_pos = self.buffer_len;
                continue;
            };

            let terminator = slice[idx];
            if let Err(err) = self.append(self.buffer_pos, idx) {
                return Some(Err(err));
            }
            self.buffer_pos += idx + 1;
            self.skip_lf = terminator == b'\r';
            return Some(Ok(self.finish_line()));
        }
    }

    fn append(&mut self, start: usize, len: usize) -> Result<(), SplitError> {
        if self.current_line.len().saturating_add(len) > self.max_line_bytes {
            self.done = true;
            self.current_line.clear();
            return Err(SplitError::LineTooLong {
                line_number: self.line_number + 1,
                max_line_bytes: self.max_line_bytes,
            });
        }
        self.current_line
            .extend_from_slice(&self.buffer[start..start + len]);
        Ok(())
    }

    fn finish_line(&mut self) -> Vec<u8> {
        self.line_number += 1;
        std::mem::take(&mut self.current_line)
    }
}
