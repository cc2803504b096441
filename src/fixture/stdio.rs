//! stdio channel for the fixture binary.
//!
//! - Messages are UTF-8 encoded JSON-RPC, one per line
//! - stdin: receives messages from the client
//! - stdout: sends messages to the client
//! - stderr: logging only

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Line-oriented reader/writer over the process's stdin and stdout.
pub struct StdioChannel {
    reader: BufReader<tokio::io::Stdin>,
    writer: tokio::io::Stdout,
}

impl StdioChannel {
    /// Creates a channel over the process's standard streams.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            writer: tokio::io::stdout(),
        }
    }

    /// Reads the next line from stdin without its terminator.
    ///
    /// Returns `None` once stdin is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from stdin fails.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let bytes_read = self.reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            return Ok(None);
        }

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }

    /// Writes one serialised message followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to stdout fails.
    pub async fn write_line(&mut self, json: &str) -> io::Result<()> {
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

impl Default for StdioChannel {
    fn default() -> Self {
        Self::new()
    }
}
