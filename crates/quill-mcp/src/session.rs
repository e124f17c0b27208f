//! Session lifecycle: connect every configured backend, build the router,
//! and tear everything down on any exit path.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::ServersConfig;
use crate::error::Result;
use crate::router::ToolRouter;
use crate::stdio::StdioBackend;

/// All connected tool backends plus the router over their tools.
pub struct ToolSession {
    backends: Vec<Arc<StdioBackend>>,
    router: Arc<ToolRouter>,
}

impl ToolSession {
    /// Spawn, initialize, and register every server in the config. If any
    /// step fails, backends started so far are shut down before the error
    /// is returned.
    pub async fn connect(config: &ServersConfig) -> Result<Self> {
        let router = Arc::new(ToolRouter::new());
        let mut backends: Vec<Arc<StdioBackend>> = Vec::new();

        for (name, server) in &config.servers {
            let connected = async {
                let backend = Arc::new(StdioBackend::spawn(name.clone(), server).await?);
                backend.initialize().await?;
                let count = router.register_backend(Arc::clone(&backend) as _).await?;
                info!(server = %name, tools = count, "connected backend");
                Ok::<_, crate::error::BackendError>(backend)
            }
            .await;

            match connected {
                Ok(backend) => backends.push(backend),
                Err(e) => {
                    error!(server = %name, "failed to connect backend: {}", e);
                    for backend in &backends {
                        backend.shutdown().await;
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self { backends, router })
    }

    pub fn router(&self) -> Arc<ToolRouter> {
        Arc::clone(&self.router)
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    pub async fn shutdown(self) {
        for backend in &self.backends {
            backend.shutdown().await;
        }
    }
}
