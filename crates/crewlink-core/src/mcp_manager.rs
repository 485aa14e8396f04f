//! Tool provider lifecycle
//!
//! Starts MCP tool-provider processes, collects the tools they expose and
//! stops them again. Stopping is attempted for every started provider even
//! when some of them fail to stop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crewlink_mcp::client::DEFAULT_REQUEST_TIMEOUT;
use crewlink_mcp::{ClientInfo, McpClient, ServerInfo, StdioTransport, Transport};
use tracing::{debug, info, warn};

use crate::definition::LaunchSpec;
use crate::error::{Error, Result};
use crate::tools::mcp::McpToolWrapper;
use crate::tools::Tool;

/// A started source of tools
#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn name(&self) -> &str;

    fn tools(&self) -> Vec<Arc<dyn Tool>>;

    async fn stop(&self) -> Result<()>;
}

/// Turns a launch specification into a started provider
#[async_trait]
pub trait ProviderLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ToolProvider>>;
}

/// A tool provider reached over an MCP transport
pub struct McpToolProvider {
    name: String,
    client: Arc<McpClient>,
    server_info: ServerInfo,
    tools: Vec<Arc<dyn Tool>>,
}

impl McpToolProvider {
    /// Run the MCP handshake and discover tools, all within `startup_timeout`.
    /// The transport is closed again if any step fails.
    pub async fn connect(
        name: &str,
        transport: Box<dyn Transport>,
        startup_timeout: Duration,
    ) -> Result<Self> {
        let mut client = McpClient::from_boxed(transport)
            .with_request_timeout(startup_timeout.max(DEFAULT_REQUEST_TIMEOUT));

        let handshake = async {
            let info = client
                .initialize(ClientInfo::new("crewlink", env!("CARGO_PKG_VERSION")))
                .await?;
            let tools = client.list_tools().await?;
            Ok::<_, crewlink_mcp::McpError>((info, tools))
        };

        let outcome = match tokio::time::timeout(startup_timeout, handshake).await {
            Ok(Ok(pair)) => Ok(pair),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "no response within {}s",
                startup_timeout.as_secs_f32()
            )),
        };

        let (server_info, mcp_tools) = match outcome {
            Ok(pair) => pair,
            Err(reason) => {
                if let Err(e) = client.close().await {
                    debug!(server = %name, error = %e, "Closing transport after failed start");
                }
                return Err(Error::ProviderStart {
                    name: name.to_string(),
                    reason,
                });
            }
        };

        info!(
            server = %name,
            server_name = %server_info.name,
            server_version = %server_info.version,
            tools = mcp_tools.len(),
            "MCP tool provider ready"
        );

        let client = Arc::new(client);
        let tools = mcp_tools
            .into_iter()
            .map(|t| Arc::new(McpToolWrapper::new(t, name, client.clone())) as Arc<dyn Tool>)
            .collect();

        Ok(Self {
            name: name.to_string(),
            client,
            server_info,
            tools,
        })
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}

#[async_trait]
impl ToolProvider for McpToolProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.clone()
    }

    async fn stop(&self) -> Result<()> {
        self.client.close().await.map_err(|e| Error::ProviderStop {
            name: self.name.clone(),
            reason: e.to_string(),
        })
    }
}

/// Launches providers as local subprocesses speaking MCP over stdio
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioLauncher;

#[async_trait]
impl ProviderLauncher for StdioLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ToolProvider>> {
        let transport = StdioTransport::spawn(&spec.command, &spec.args, &spec.env)
            .await
            .map_err(|e| Error::ProviderStart {
                name: spec.name.clone(),
                reason: format!("could not run '{}': {}", spec.command, e),
            })?;
        debug!(server = %spec.name, pid = ?transport.pid(), "Tool provider process started");

        let provider = McpToolProvider::connect(&spec.name, Box::new(transport), spec.timeout).await?;
        Ok(Box::new(provider))
    }
}

/// Ordered set of started tool providers
///
/// Dropping the manager without [`stop_all`](Self::stop_all) still kills
/// stdio children, since their processes are spawned with kill-on-drop.
pub struct McpServerManager {
    launcher: Arc<dyn ProviderLauncher>,
    providers: Vec<Box<dyn ToolProvider>>,
}

impl McpServerManager {
    pub fn new(launcher: Arc<dyn ProviderLauncher>) -> Self {
        Self {
            launcher,
            providers: Vec::new(),
        }
    }

    /// Manager backed by [`StdioLauncher`]
    pub fn stdio() -> Self {
        Self::new(Arc::new(StdioLauncher))
    }

    /// Start one provider. A provider that fails to start is not recorded.
    pub async fn start(&mut self, spec: &LaunchSpec) -> Result<&dyn ToolProvider> {
        if self.providers.iter().any(|p| p.name() == spec.name) {
            return Err(Error::ProviderStart {
                name: spec.name.clone(),
                reason: "a provider with this name is already running".to_string(),
            });
        }

        let provider = self.launcher.launch(spec).await?;
        self.providers.push(provider);
        Ok(self.providers[self.providers.len() - 1].as_ref())
    }

    /// Names of started providers, in start order
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Tools of one provider
    pub fn provider_tools(&self, name: &str) -> Option<Vec<Arc<dyn Tool>>> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.tools())
    }

    /// Per-provider tool counts, in start order
    pub fn tool_counts(&self) -> Vec<(String, usize)> {
        self.providers
            .iter()
            .map(|p| (p.name().to_string(), p.tools().len()))
            .collect()
    }

    /// Sum of every provider's tool count
    pub fn total_tool_count(&self) -> usize {
        self.tool_counts().iter().map(|(_, n)| n).sum()
    }

    /// First tool with the given name, searching providers in start order
    pub fn find_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.providers
            .iter()
            .flat_map(|p| p.tools())
            .find(|t| t.name() == name)
    }

    /// Stop every started provider in start order.
    ///
    /// Each stop is attempted regardless of earlier failures; the outcome of
    /// every attempt is returned. The manager is empty afterwards.
    pub async fn stop_all(&mut self) -> Vec<(String, Result<()>)> {
        let mut results = Vec::with_capacity(self.providers.len());

        for provider in self.providers.drain(..) {
            let name = provider.name().to_string();
            let result = provider.stop().await;
            match &result {
                Ok(()) => info!(server = %name, "Tool provider stopped"),
                Err(e) => warn!(server = %name, error = %e, "Tool provider failed to stop"),
            }
            results.push((name, result));
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stdio_launch_of_missing_command_is_not_recorded() {
        let mut manager = McpServerManager::stdio();
        let spec = LaunchSpec::new("ghost", "crewlink-definitely-not-a-command");

        let err = manager.start(&spec).await.err().unwrap();
        match err {
            Error::ProviderStart { name, reason } => {
                assert_eq!(name, "ghost");
                assert!(reason.contains("crewlink-definitely-not-a-command"));
            }
            other => panic!("expected ProviderStart, got {:?}", other),
        }

        assert!(manager.is_empty());
        assert!(manager.stop_all().await.is_empty());
    }
}
