pub mod executable;
pub mod hello;
pub mod iterate;
pub mod lookup;

use std::num::ParseIntError;
use std::vec;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error as ThisError;
use tokio_util::sync::CancellationToken;

use crate::backend::BackendError;
use crate::commands::executable::Executable;
use crate::frame::{Frame, Response};
use crate::store::Store;

use hello::Hello;
use iterate::Iterate;
use lookup::Lookup;

/// Keys starting with this prefix live in the namespace shared by all users. The backend stores
/// them without it.
pub const SHARED_PREFIX: &str = "shared/";

#[derive(Debug, PartialEq)]
pub enum Command {
    Hello(Hello),
    Lookup(Lookup),
    Iterate(Iterate),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CommandKind {
    Hello,
    Lookup,
    Iterate,
}

impl CommandKind {
    pub fn arity(self) -> usize {
        match self {
            // major version, minor version, value type, obsolete user, dictionary name
            CommandKind::Hello => 5,
            // key, user
            CommandKind::Lookup => 2,
            // flags, max rows, path, user
            CommandKind::Iterate => 4,
        }
    }
}

impl TryFrom<u8> for CommandKind {
    type Error = CommandError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'H' => Ok(CommandKind::Hello),
            b'L' => Ok(CommandKind::Lookup),
            b'I' => Ok(CommandKind::Iterate),
            byte => Err(CommandError::UnsupportedCommand(byte)),
        }
    }
}

impl From<CommandKind> for u8 {
    fn from(kind: CommandKind) -> Self {
        match kind {
            CommandKind::Hello => b'H',
            CommandKind::Lookup => b'L',
            CommandKind::Iterate => b'I',
        }
    }
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Hello(_) => CommandKind::Hello,
            Command::Lookup(_) => CommandKind::Lookup,
            Command::Iterate(_) => CommandKind::Iterate,
        }
    }
}

#[async_trait]
impl Executable for Command {
    async fn exec(
        self,
        store: &Store,
        cancel: &CancellationToken,
    ) -> Result<Vec<Response>, CommandError> {
        match self {
            Command::Hello(cmd) => cmd.exec(store, cancel).await,
            Command::Lookup(cmd) => cmd.exec(store, cancel).await,
            Command::Iterate(cmd) => cmd.exec(store, cancel).await,
        }
    }
}

impl TryFrom<Frame> for Command {
    type Error = CommandError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        let kind = CommandKind::try_from(frame.command)?;

        // Arity is checked before anything else looks at the arguments.
        if frame.args.len() != kind.arity() {
            return Err(CommandError::WrongArity {
                command: kind,
                expected: kind.arity(),
                actual: frame.args.len(),
            });
        }

        let parser = &mut CommandParser {
            parts: frame.args.into_iter(),
        };

        match kind {
            CommandKind::Hello => Hello::try_from(parser).map(Command::Hello),
            CommandKind::Lookup => Lookup::try_from(parser).map(Command::Lookup),
            CommandKind::Iterate => Iterate::try_from(parser).map(Command::Iterate),
        }
    }
}

pub(crate) struct CommandParser {
    parts: vec::IntoIter<Bytes>,
}

impl CommandParser {
    fn next_bytes(&mut self) -> Result<Bytes, CommandError> {
        self.parts.next().ok_or(CommandError::EndOfStream)
    }

    fn next_string(&mut self) -> Result<String, CommandError> {
        let bytes = self.next_bytes()?;

        String::from_utf8(bytes.to_vec()).map_err(|_| CommandError::InvalidUtf8)
    }

    /// For fields that are only logged, where invalid UTF-8 is no reason to fail.
    fn next_lossy_string(&mut self) -> Result<String, CommandError> {
        let bytes = self.next_bytes()?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[derive(Debug, ThisError)]
pub enum CommandError {
    #[error("protocol error: expected {expected} arguments, received {actual}")]
    WrongArity {
        command: CommandKind,
        expected: usize,
        actual: usize,
    },
    #[error("incompatible major protocol version '{0}'")]
    IncompatibleVersion(String),
    #[error("unsupported command")]
    UnsupportedCommand(u8),
    #[error("protocol error: argument is not valid UTF-8")]
    InvalidUtf8,
    #[error("protocol error: missing argument")]
    EndOfStream,
    #[error("malformed flags value: {0}")]
    MalformedFlags(#[source] ParseIntError),
    #[error("malformed max rows value: {0}")]
    MalformedRowLimit(#[source] ParseIntError),
    #[error("asynchronous iteration is not supported")]
    AsyncIteration,
    #[error("must request either sorting by key or value, not both")]
    ConflictingSortOrder,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl CommandError {
    /// Fatal errors close the connection once the failure response is sent. Only a broken
    /// handshake is fatal, the client cannot be talked to after it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CommandError::IncompatibleVersion(_)
                | CommandError::WrongArity {
                    command: CommandKind::Hello,
                    ..
                }
        )
    }
}

/// Splits the shared namespace prefix off `key`, if present.
pub(crate) fn strip_shared_prefix(key: &str) -> (&'static str, &str) {
    match key.strip_prefix(SHARED_PREFIX) {
        Some(stripped) => (SHARED_PREFIX, stripped),
        None => ("", key),
    }
}
