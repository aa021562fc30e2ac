use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::commands::CommandError;
use crate::frame::Response;
use crate::store::Store;

#[async_trait]
pub trait Executable {
    /// Runs the command, returning the responses to write in order. An empty list means the
    /// command is answered with silence.
    async fn exec(
        self,
        store: &Store,
        cancel: &CancellationToken,
    ) -> Result<Vec<Response>, CommandError>;
}
