use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::frame::{Error, Frame, Response, LINE_TERMINATOR};

pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Splits the byte stream into request frames and writes responses back.
#[derive(Debug)]
pub struct DictCodec {
    max_line_length: usize,
    // Where to resume looking for a line terminator, so a partial line is only scanned once.
    next_index: usize,
}

impl DictCodec {
    pub fn new(max_line_length: usize) -> DictCodec {
        DictCodec {
            max_line_length,
            next_index: 0,
        }
    }
}

impl Default for DictCodec {
    fn default() -> Self {
        DictCodec::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl Decoder for DictCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let terminator = src[self.next_index..]
                .iter()
                .position(|&byte| byte == LINE_TERMINATOR);

            let Some(offset) = terminator else {
                // A pending line over the limit fails now instead of being buffered forever.
                if src.len() > self.max_line_length {
                    return Err(Error::LineTooLong {
                        max: self.max_line_length,
                    });
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;

            if end > self.max_line_length {
                return Err(Error::LineTooLong {
                    max: self.max_line_length,
                });
            }

            let line = src.split_to(end);
            src.advance(1);

            match Frame::parse(&line) {
                Some(frame) => return Ok(Some(frame)),
                None => debug!("Received an empty line"),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // An unterminated line at the end of the stream is not a request.
                if !src.is_empty() {
                    debug!(bytes = src.len(), "Discarding an incomplete line");
                    src.clear();
                }
                self.next_index = 0;
                Ok(None)
            }
        }
    }
}

impl Encoder<Response> for DictCodec {
    type Error = Error;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.serialize(dst);
        Ok(())
    }
}
