use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::commands::executable::Executable;
use crate::commands::{Command, CommandError};
use crate::config::Config;
use crate::connection::Connection;
use crate::frame::{self, Frame, Response};
use crate::listen::{ListenAddress, Listener};
use crate::store::Store;
use crate::Error;

// Pause after a failed accept, so running out of descriptors does not turn into a busy loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Binds the listener, connects the backend and serves clients until `shutdown` is cancelled.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<(), Error> {
    let address: ListenAddress = config.listen.parse()?;
    let listener = address.bind().await?;

    let store = match Store::connect(&config.backend_url, config.store_options()).await {
        Ok(store) => store,
        Err(e) => {
            listener.cleanup();
            return Err(e.into());
        }
    };

    info!(listen = %listener.local_addr(), "Dictionary server listening");

    serve(listener, store, config.max_line_length, shutdown).await;

    info!("Dictionary server stopped");
    Ok(())
}

/// The accept loop. Every client is served on its own task with a token that is a child of
/// `shutdown`.
pub async fn serve(
    listener: Listener,
    store: Store,
    max_line_length: usize,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, remote_addr) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "Failed to accept a connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let conn = Connection::new(stream, remote_addr, max_line_length);
        info!(connection_id = %conn.id, remote_addr = %conn.remote_addr, "Accepted connection");

        let store = store.clone();
        let cancel = shutdown.child_token();
        tokio::spawn(async move {
            handle_connection(conn, store, cancel).await;
        });
    }

    listener.cleanup();
}

/// Serves one client: reads a line, answers it, repeats. Requests on one connection are handled
/// strictly in order.
#[instrument(
    name = "connection",
    skip_all,
    fields(connection_id = %conn.id, remote_addr = %conn.remote_addr)
)]
pub async fn handle_connection<S>(
    mut conn: Connection<S>,
    store: Store,
    cancel: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Closing connection on shutdown");
                break;
            }
            read = conn.read_frame() => read,
        };

        let frame = match read {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Connection closed");
                break;
            }
            Err(frame::Error::Io(e)) => {
                warn!(error = %e, "Failed to read from connection");
                break;
            }
            Err(e) => {
                // The stream cannot be resynchronised after a framing error.
                warn!(error = %e, "Closing connection after a framing error");
                if let Err(write_err) = conn.write_responses(vec![Response::failure(&e)]).await {
                    debug!(error = %write_err, "Failed to report the framing error");
                }
                break;
            }
        };

        debug!(request = %frame, "Received a line");

        let (responses, fatal) = match dispatch(frame, &store, &cancel).await {
            Ok(responses) => (responses, false),
            Err(e) => {
                warn!(error = %e, "Request failed");
                (vec![Response::failure(&e)], e.is_fatal())
            }
        };

        if let Err(e) = conn.write_responses(responses).await {
            warn!(error = %e, "Failed to write to connection");
            break;
        }

        if fatal {
            info!("Closing connection after a fatal error");
            break;
        }
    }

    if let Err(e) = conn.shutdown().await {
        debug!(error = %e, "Failed to shut down connection");
    }
}

#[instrument(skip_all, fields(command = %char::from(frame.command)))]
async fn dispatch(
    frame: Frame,
    store: &Store,
    cancel: &CancellationToken,
) -> Result<Vec<Response>, CommandError> {
    let cmd = Command::try_from(frame)?;

    cmd.exec(store, cancel).await
}
