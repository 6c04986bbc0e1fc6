// src/glue/pump.rs

//! The actual forwarding loops.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::channel::{ChannelOutput, OutputStream};

/// Read buffer for the forwarding pumps. 16 KiB per read for throughput.
const READ_BUFFER: usize = 16 * 1024;

/// Forward bytes from a process output stream to the channel.
///
/// Reads a chunk, sends it tagged as `stream`, reads again. Ends when the
/// source reaches end-of-stream, errors, or the channel's receiving side is
/// gone. The bounded send provides back-pressure: the pump never reads faster
/// than the channel accepts writes.
pub fn spawn_output_pump<R>(
    mut reader: R,
    output_tx: mpsc::Sender<ChannelOutput>,
    stream: OutputStream,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; READ_BUFFER];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    debug!(?stream, "output pump reached end of stream");
                    break;
                }
                Ok(n) => {
                    trace!(?stream, len = n, "forwarding process output to channel");
                    let chunk = ChannelOutput::stream_data(stream, buf[..n].to_vec());
                    if output_tx.send(chunk).await.is_err() {
                        debug!(?stream, "channel output receiver gone; stopping pump");
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(?stream, error = %e, "output pump read error");
                    break;
                }
            }
        }
    })
}

/// Forward inbound channel data to a process input stream.
///
/// Drains the data channel into the writer. When the data channel closes
/// (all senders dropped), the writer is shut down so the process sees EOF on
/// stdin: a half-close of this direction only, leaving the output direction
/// free to keep draining.
///
/// If the process closes its stdin early, remaining channel data is consumed
/// and dropped so the inbound direction cannot back up the channel.
pub fn spawn_input_pump<W>(mut data_rx: mpsc::Receiver<Vec<u8>>, mut writer: W) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(bytes) = data_rx.recv().await {
            trace!(len = bytes.len(), "forwarding channel data to process stdin");
            let res = async {
                writer.write_all(&bytes).await?;
                writer.flush().await
            }
            .await;
            if let Err(e) = res {
                debug!(error = %e, "process stdin closed; draining remaining channel data");
                while data_rx.recv().await.is_some() {}
                return;
            }
        }
        if let Err(e) = writer.shutdown().await {
            debug!(error = %e, "stdin shutdown after channel data ended");
        }
    })
}

/// The stdin/stdout couple for one process.
///
/// Both directions run as independent tasks; either may finish first. Joining
/// both is the signal that the glue is fully done.
pub struct StreamGlue {
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
}

impl StreamGlue {
    /// Couple a process's stdout/stdin with a channel's outbound/inbound
    /// byte flow.
    pub fn couple<R, W>(
        stdout: R,
        stdin: W,
        data_rx: mpsc::Receiver<Vec<u8>>,
        output_tx: mpsc::Sender<ChannelOutput>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            inbound: spawn_input_pump(data_rx, stdin),
            outbound: spawn_output_pump(stdout, output_tx, OutputStream::Stdout),
        }
    }

    /// Wait for both directions to finish.
    pub async fn join(self) {
        let _ = self.inbound.await;
        let _ = self.outbound.await;
    }
}

/// Pump `reader` into `writer` until end-of-stream, then half-close the
/// writer. Returns the number of bytes forwarded.
///
/// Used for the guest serial console passthrough, where both endpoints are
/// plain byte streams.
pub async fn copy_stream<R, W>(mut reader: R, mut writer: W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; READ_BUFFER];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        total += n as u64;
    }
    writer.shutdown().await?;
    Ok(total)
}
