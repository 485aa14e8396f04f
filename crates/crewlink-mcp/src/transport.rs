//! MCP Transport layer implementations

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long a stdio server gets to exit after its stdin is closed
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Transport trait for MCP communication
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&mut self, message: Value) -> io::Result<()>;
    async fn receive(&mut self) -> io::Result<Option<Value>>;
    async fn close(&mut self) -> io::Result<()>;
}

/// Stdio transport for subprocess communication
///
/// Messages are newline-delimited JSON on the child's stdin/stdout. The
/// child's stderr is inherited so server diagnostics reach the console.
pub struct StdioTransport {
    label: String,
    child: Child,
    stdin: Option<ChildStdin>,
    reader: Option<BufReader<ChildStdout>>,
}

impl StdioTransport {
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> io::Result<Self> {
        info!(command = %command, args = ?args, "Spawning MCP server process");

        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture stdout"))?;

        Ok(Self {
            label: command.to_string(),
            child,
            stdin: Some(stdin),
            reader: Some(BufReader::new(stdout)),
        })
    }

    /// OS process id of the server, if it is still running
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "Stdin not available"))?;

        let json = serde_json::to_string(&message)?;
        debug!(server = %self.label, message = %json, "-> MCP");
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        Ok(())
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| io::Error::other("Reader not available"))?;

        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line).await?;

            if n == 0 {
                return Ok(None);
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(server = %self.label, message = %trimmed, "<- MCP");
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => return Ok(Some(value)),
                // Some servers print banners on stdout; they are not protocol traffic.
                Err(e) => warn!(server = %self.label, error = %e, "Ignoring non-JSON line from MCP server"),
            }
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        // Closing stdin is the MCP stdio shutdown signal.
        drop(self.stdin.take());
        self.reader = None;

        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(server = %self.label, status = %status, "MCP server exited");
                Ok(())
            }
            Err(_) => {
                warn!(server = %self.label, "MCP server did not exit after stdin closed, killing");
                self.child.kill().await
            }
        }
    }
}

/// In-memory duplex transport
///
/// Each half sends into the other's receiver. Used to host MCP servers
/// in-process.
pub struct ChannelTransport {
    tx: Option<mpsc::UnboundedSender<Value>>,
    rx: mpsc::UnboundedReceiver<Value>,
}

impl ChannelTransport {
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self { tx: Some(a_tx), rx: b_rx },
            Self { tx: Some(b_tx), rx: a_rx },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "Transport closed"))?;
        tx.send(message)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "Peer disconnected"))
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_channel_pair_delivers_both_ways() {
        let (mut a, mut b) = ChannelTransport::pair();

        a.send(json!({"hello": "b"})).await.unwrap();
        b.send(json!({"hello": "a"})).await.unwrap();

        assert_eq!(b.receive().await.unwrap(), Some(json!({"hello": "b"})));
        assert_eq!(a.receive().await.unwrap(), Some(json!({"hello": "a"})));
    }

    #[tokio::test]
    async fn test_channel_close_ends_peer_stream() {
        let (mut a, mut b) = ChannelTransport::pair();
        a.close().await.unwrap();

        assert_eq!(b.receive().await.unwrap(), None);
        assert!(a.send(json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_spawn_missing_command_fails() {
        let result = StdioTransport::spawn(
            "crewlink-definitely-not-a-command",
            &[],
            &HashMap::new(),
        )
        .await;
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdio_echo_and_close() {
        let mut transport = StdioTransport::spawn("cat", &[], &HashMap::new()).await.unwrap();
        assert!(transport.pid().is_some());

        transport.send(json!({"jsonrpc": "2.0", "method": "ping"})).await.unwrap();
        assert_eq!(
            transport.receive().await.unwrap(),
            Some(json!({"jsonrpc": "2.0", "method": "ping"}))
        );

        // cat exits on EOF, so close returns without killing
        transport.close().await.unwrap();
        assert!(transport.pid().is_none());
    }
}
