use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    error::DecodeError,
    frame::Frame,
    frame_parser::{FrameParser, FrameParserResult},
};

const READ_BUFFER_SIZE: usize = 256;

/// Pulls bytes from a link and hands back one [`Frame`] per call.
///
/// Reads are buffered, so the link may deliver one byte or a whole burst of
/// frames per read. `next` is cancel safe: dropping it while it waits on the
/// link loses neither bytes nor the partially parsed frame.
pub struct Decoder<R> {
    reader: R,
    parser: FrameParser,
    buf: [u8; READ_BUFFER_SIZE],
    pos: usize,
    have: usize,
}

impl<R: AsyncRead + Unpin> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: FrameParser::new(),
            buf: [0; READ_BUFFER_SIZE],
            pos: 0,
            have: 0,
        }
    }

    /// Decode the next frame.
    ///
    /// A checksum mismatch returns the frame inside the error. End of stream
    /// is reported as an [`io::ErrorKind::UnexpectedEof`] I/O error, whether
    /// or not a frame was in progress.
    pub async fn next(&mut self) -> Result<Frame, DecodeError> {
        loop {
            if self.pos >= self.have {
                let n = self.reader.read(&mut self.buf).await?;
                if n == 0 {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "link closed").into());
                }
                self.pos = 0;
                self.have = n;
            }

            match self.parser.parse(&self.buf[self.pos..self.have]) {
                FrameParserResult::Ready { frame, consumed } => {
                    self.pos += consumed;
                    return Ok(frame);
                }
                FrameParserResult::Incomplete { .. } => {
                    self.pos = self.have;
                }
                FrameParserResult::Error { err, consumed } => {
                    self.pos += consumed;
                    return Err(err);
                }
            }
        }
    }
}
