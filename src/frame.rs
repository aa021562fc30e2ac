// Every record is a single line: a leading type byte followed by TAB separated fields. Control
// bytes inside a field are escaped with the 0x01 marker followed by a tag character.

use std::fmt;
use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use itertools::Itertools;
use thiserror::Error as ThisError;

pub const ESCAPE_MARKER: u8 = 0x01;
pub const FIELD_SEPARATOR: u8 = b'\t';
pub const LINE_TERMINATOR: u8 = b'\n';

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("protocol error; line exceeds the maximum length of {max} bytes")]
    LineTooLong { max: usize },
    #[error("{0}")]
    Io(#[from] io::Error),
}

// Indexed by the raw byte; zero means the byte is written as is.
const ESCAPE_TAGS: [u8; 256] = {
    let mut tags = [0u8; 256];
    tags[0x00] = b'0';
    tags[ESCAPE_MARKER as usize] = b'1';
    tags[b'\t' as usize] = b't';
    tags[b'\r' as usize] = b'r';
    tags[b'\n' as usize] = b'l';
    tags
};

fn unescape_tag(tag: u8) -> u8 {
    match tag {
        b'0' => 0x00,
        b'1' => ESCAPE_MARKER,
        b't' => b'\t',
        b'r' => b'\r',
        b'l' => b'\n',
        // Unknown tags lose the marker and are kept literally.
        tag => tag,
    }
}

/// Appends `src` to `dst`, replacing every byte that may not appear raw inside a field.
pub fn escape(src: &[u8], dst: &mut BytesMut) {
    dst.reserve(src.len());
    for &byte in src {
        match ESCAPE_TAGS[byte as usize] {
            0 => dst.put_u8(byte),
            tag => {
                dst.put_u8(ESCAPE_MARKER);
                dst.put_u8(tag);
            }
        }
    }
}

/// Reverses [`escape`].
pub fn unescape(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    let mut bytes = src.iter().copied();

    while let Some(byte) = bytes.next() {
        if byte != ESCAPE_MARKER {
            out.push(byte);
            continue;
        }

        match bytes.next() {
            Some(tag) => out.push(unescape_tag(tag)),
            // A trailing marker has nothing to escape.
            None => out.push(byte),
        }
    }

    out
}

/// A request line: the command byte and its already unescaped arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub command: u8,
    pub args: Vec<Bytes>,
}

impl Frame {
    pub fn new<I, A>(command: u8, args: I) -> Frame
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        Frame {
            command,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a line without its terminator. Empty lines carry no frame.
    pub fn parse(line: &[u8]) -> Option<Frame> {
        let (&command, rest) = line.split_first()?;

        let args = rest
            .split(|&byte| byte == FIELD_SEPARATOR)
            .map(|field| Bytes::from(unescape(field)))
            .collect();

        Some(Frame { command, args })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]",
            char::from(self.command),
            self.args
                .iter()
                .map(|arg| String::from_utf8_lossy(arg))
                .join(", ")
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum Status {
    Ok,
    NotFound,
    Failure,
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        match status {
            Status::Ok => b'O',
            Status::NotFound => b'N',
            Status::Failure => b'F',
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Line { status: Status, values: Vec<String> },
    /// Bare line terminator closing a multi-row result.
    End,
}

impl Response {
    pub fn ok<I, S>(values: I) -> Response
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Response::Line {
            status: Status::Ok,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_found() -> Response {
        Response::Line {
            status: Status::NotFound,
            values: vec![],
        }
    }

    pub fn failure(message: impl fmt::Display) -> Response {
        Response::Line {
            status: Status::Failure,
            values: vec![message.to_string()],
        }
    }

    pub fn serialize(&self, dst: &mut BytesMut) {
        match self {
            Response::Line { status, values } => {
                dst.reserve(2 + values.iter().map(|value| value.len() + 1).sum::<usize>());
                dst.put_u8(u8::from(*status));
                for value in values {
                    dst.put_u8(FIELD_SEPARATOR);
                    escape(value.as_bytes(), dst);
                }
                dst.put_u8(LINE_TERMINATOR);
            }
            Response::End => dst.put_u8(LINE_TERMINATOR),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Line { status, values } => {
                write!(f, "{}", char::from(u8::from(*status)))?;
                for value in values {
                    write!(f, "\\t{}", value.escape_debug())?;
                }
                Ok(())
            }
            Response::End => write!(f, "<end>"),
        }
    }
}
