//! Writing of single protocol lines, shared by the server and the client session.

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Writes the line plus the terminating newline and flushes right away.
pub(crate) async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buffer = String::with_capacity(line.len() + 1);
    buffer.push_str(line);
    buffer.push('\n');
    writer.write_all(buffer.as_bytes()).await?;
    writer.flush().await
}

/// How one of the paired tasks of a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionEnd {
    /// The peer closed the connection or said goodbye. The engine has been told already.
    PeerLeft,
    /// We were told to close the connection.
    Released,
    /// Writing failed, the engine does not know about it yet.
    WriteFailed,
    /// The engine is not listening anymore.
    EngineGone,
}
