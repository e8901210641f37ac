//! Child output forwarding into the log stream.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Spawn a background task that forwards lines from one child stream to the
/// log, tagged with the service name and stream label.
///
/// The task runs until EOF or until `cancel` fires. Cancellation covers the
/// case where a grandchild inherited the pipe and keeps it open after the
/// service itself died; without it the drain would never see EOF.
#[must_use]
pub fn spawn_drain<R>(
    service: String,
    stream: &'static str,
    source: R,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(source).lines();
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!(service, stream, "output drain cancelled");
                    break;
                }

                next = lines.next_line() => {
                    match next {
                        Ok(Some(line)) => {
                            info!(service = %service, stream, "{line}");
                        }
                        Ok(None) => {
                            debug!(service, stream, "output stream closed");
                            break;
                        }
                        Err(err) => {
                            warn!(service, stream, %err, "error reading service output");
                            break;
                        }
                    }
                }
            }
        }
    })
}
