use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Framed;
use tracing::debug;
use uuid::Uuid;

use crate::codec::DictCodec;
use crate::frame::{self, Frame, Response};

pub struct Connection<S> {
    pub id: Uuid,
    pub remote_addr: String,
    // Incoming bytes are buffered by the codec until a whole line is available. Outgoing
    // responses are buffered until flushed, so a multi-row result leaves in one piece.
    framed: Framed<S, DictCodec>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, remote_addr: impl Into<String>, max_line_length: usize) -> Connection<S> {
        Connection {
            id: Uuid::new_v4(),
            remote_addr: remote_addr.into(),
            framed: Framed::new(stream, DictCodec::new(max_line_length)),
        }
    }

    /// Reads the next request. `None` means the peer closed the connection.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, frame::Error> {
        self.framed.next().await.transpose()
    }

    pub async fn write_responses(&mut self, responses: Vec<Response>) -> Result<(), frame::Error> {
        for response in responses {
            debug!(response = %response, "Sending a line");
            self.framed.feed(response).await?;
        }
        SinkExt::<Response>::flush(&mut self.framed).await
    }

    pub async fn shutdown(&mut self) -> Result<(), frame::Error> {
        SinkExt::<Response>::flush(&mut self.framed).await?;
        self.framed.get_mut().shutdown().await?;
        Ok(())
    }
}
