//! Host transport
//!
//! Envelopes leave the process either as newline-delimited JSON (stdout,
//! the default) or as length-prefixed JSON over a local socket
//! (Unix domain socket / Windows named pipe via the interprocess crate).

use std::io;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::protocol::Envelope;

/// Maximum message size (64 MB, reports can be large)
const MAX_MESSAGE_SIZE: u32 = 64 * 1024 * 1024;

// Platform-specific imports and type aliases
#[cfg(unix)]
pub mod platform {
    pub use interprocess::local_socket::tokio::{prelude::*, Stream};
    pub use interprocess::local_socket::GenericFilePath;
}

#[cfg(windows)]
pub mod platform {
    pub use interprocess::local_socket::tokio::{prelude::*, Stream};
    pub use interprocess::local_socket::GenericNamespaced;
}

use platform::*;

pub use platform::Stream;

/// How envelopes are delimited on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One JSON object per line
    Lines,
    /// Little-endian u32 length, then the JSON body
    LengthPrefixed,
}

/// Connect to the host's socket
///
/// On Unix `name` is a filesystem path; on Windows a pipe name.
pub async fn connect(name: &str) -> io::Result<Stream> {
    #[cfg(unix)]
    let stream = {
        let name = name.to_fs_name::<GenericFilePath>()?;
        Stream::connect(name).await?
    };

    #[cfg(windows)]
    let stream = {
        let name = name.to_ns_name::<GenericNamespaced>()?;
        Stream::connect(name).await?
    };

    Ok(stream)
}

/// Send a length-prefixed message
pub async fn send_message<W: AsyncWriteExt + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    if data.len() > MAX_MESSAGE_SIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Message too large",
        ));
    }

    let len = data.len() as u32;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Receive a length-prefixed message
pub async fn recv_message<R: AsyncReadExt + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf);

    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message too large: {} bytes", len),
        ));
    }

    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data).await?;
    Ok(data)
}

/// Send one newline-terminated JSON message
pub async fn send_line<W: AsyncWriteExt + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    writer.write_all(data).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Drain the channel into `writer` until every sender is dropped
///
/// Returns the number of envelopes written. A write error stops the task;
/// envelopes still queued after that are lost, which the host sees as a
/// missing `finished` message.
pub fn spawn_writer<W>(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    mut writer: W,
    framing: Framing,
) -> JoinHandle<io::Result<usize>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut written = 0;
        while let Some(envelope) = rx.recv().await {
            let json = match serde_json::to_vec(&envelope) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!("Failed to serialize envelope: {}", e);
                    continue;
                }
            };
            let result = match framing {
                Framing::Lines => send_line(&mut writer, &json).await,
                Framing::LengthPrefixed => send_message(&mut writer, &json).await,
            };
            if let Err(e) = result {
                tracing::error!("Host transport failed after {} messages: {}", written, e);
                return Err(e);
            }
            written += 1;
        }
        tracing::debug!(written, "Host channel closed");
        Ok(written)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::Channel;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_length_prefixed_roundtrip() {
        let mut buf = Vec::new();
        send_message(&mut buf, b"{\"std_output\":\"x\"}").await.unwrap();
        assert_eq!(&buf[..4], &18u32.to_le_bytes());

        let mut reader = Cursor::new(buf);
        let data = recv_message(&mut reader).await.unwrap();
        assert_eq!(data, b"{\"std_output\":\"x\"}");
    }

    #[tokio::test]
    async fn test_recv_rejects_oversized_length() {
        let mut reader = Cursor::new((MAX_MESSAGE_SIZE + 1).to_le_bytes().to_vec());
        let err = recv_message(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_writer_emits_lines_in_order() {
        let (channel, rx) = Channel::new();
        let (client, mut server) = tokio::io::duplex(4096);
        let handle = spawn_writer(rx, client, Framing::Lines);

        channel.progress("one".to_string());
        channel.finished("<html/>".to_string(), "one".to_string());
        drop(channel);

        assert_eq!(handle.await.unwrap().unwrap(), 2);

        let mut out = String::new();
        server.read_to_string(&mut out).await.unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"std_output":"one"}"#);
        let last: Envelope = serde_json::from_str(lines[1]).unwrap();
        assert!(last.is_finished());
    }
}
