use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::commands::executable::Executable;
use crate::commands::{strip_shared_prefix, CommandError, CommandParser};
use crate::frame::Response;
use crate::store::Store;

/// Get the value of `key`. A missing key is answered with not-found.
#[derive(Debug, PartialEq)]
pub struct Lookup {
    pub key: String,
    pub user: String,
}

#[async_trait]
impl Executable for Lookup {
    async fn exec(
        self,
        store: &Store,
        cancel: &CancellationToken,
    ) -> Result<Vec<Response>, CommandError> {
        info!(key = %self.key, user = %self.user, "Received a lookup request");

        let (prefix, key) = strip_shared_prefix(&self.key);
        if !prefix.is_empty() {
            debug!(key, "Stripped the shared prefix");
        }

        let response = match store.get(cancel, key).await? {
            Some(value) => Response::ok([value]),
            None => Response::not_found(),
        };

        Ok(vec![response])
    }
}

impl TryFrom<&mut CommandParser> for Lookup {
    type Error = CommandError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let user = parser.next_string()?;

        Ok(Self { key, user })
    }
}
