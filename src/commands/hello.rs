use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::commands::executable::Executable;
use crate::commands::{CommandError, CommandParser};
use crate::frame::Response;
use crate::store::Store;

pub const SUPPORTED_MAJOR_VERSION: &str = "3";

/// The first line a client sends. Only the major protocol version is checked; a mismatch ends the
/// connection. A successful handshake is not acknowledged.
#[derive(Debug, PartialEq)]
pub struct Hello {
    pub major_version: String,
    pub minor_version: String,
    pub value_type: String,
    /// No longer used by clients, always sent empty by current ones.
    pub user: String,
    pub dictionary: String,
}

#[async_trait]
impl Executable for Hello {
    async fn exec(
        self,
        _store: &Store,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Response>, CommandError> {
        info!(
            minor_version = %self.minor_version,
            value_type = %self.value_type,
            dictionary = %self.dictionary,
            "Handshake completed"
        );

        Ok(vec![])
    }
}

impl TryFrom<&mut CommandParser> for Hello {
    type Error = CommandError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        // Compared as raw bytes, so a version that is not even UTF-8 is still just a mismatch.
        let major_version = parser.next_bytes()?;
        if major_version != SUPPORTED_MAJOR_VERSION.as_bytes() {
            return Err(CommandError::IncompatibleVersion(
                String::from_utf8_lossy(&major_version).into_owned(),
            ));
        }

        Ok(Self {
            major_version: SUPPORTED_MAJOR_VERSION.to_string(),
            minor_version: parser.next_lossy_string()?,
            value_type: parser.next_lossy_string()?,
            user: parser.next_lossy_string()?,
            dictionary: parser.next_lossy_string()?,
        })
    }
}
