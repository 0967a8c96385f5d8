//! Line-delimited JSON transport.
//!
//! MCP's stdio transport sends one UTF-8 JSON-RPC message per line: the
//! client writes to our stdin, we answer on stdout, and stderr is left for
//! logging. [`Transport`] implements that framing over any async reader and
//! writer so the server loop can be exercised against in-memory buffers.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};

/// Newline-framed message transport.
pub struct Transport<R, W> {
    reader: R,
    writer: W,
}

/// The transport used by the server binary.
pub type StdioTransport = Transport<BufReader<Stdin>, Stdout>;

impl StdioTransport {
    /// Creates a transport over the process's stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::stdio()
    }
}

impl<R, W> Transport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over an arbitrary reader and writer.
    pub const fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Reads the next message line, without its terminator.
    ///
    /// Returns `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    /// Serialises a message onto a single line and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_message<T: Serialize + ?Sized>(&mut self, message: &T) -> io::Result<()> {
        let mut json = serde_json::to_vec(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        // Compact serde_json output escapes newlines inside strings.
        debug_assert!(!json.contains(&b'\n'));
        json.push(b'\n');

        self.writer.write_all(&json).await?;
        self.writer.flush().await
    }

    /// Consumes the transport and returns the writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}
