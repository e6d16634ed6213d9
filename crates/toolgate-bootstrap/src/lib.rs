//! Composition root for toolgate.
//!
//! This is the only place where concrete adapters are chosen and wired:
//! - Registry, server, token and flow stores (via toolgate-store)
//! - MCP client factory, connection store and OAuth flows (via toolgate-mcp)
//! - Native tools, the adapter chain and the tool service (via toolgate-dispatch)
//! - The workflow engine carrying client-side tools (via toolgate-workflow)
//!
//! Callers receive a [`Toolgate`] and go through its [`ToolService`].

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use toolgate_core::{
    Keyspace, PluggableToolAdapter, RequestContext, Settings, WorkQueue, WorkflowBackend,
    WorkflowEngine,
};
use toolgate_dispatch::{
    AdapterChain, ClientSideToolAdapter, NativeToolRegistry, NoOpAdapter, PluggedToolsRegistry,
    ToolService, WorkflowToolExecutor,
};
use toolgate_mcp::{
    ConnectionStore, DefaultMcpClientFactory, McpConnectionManager, McpToolRegistry,
    McpToolsService, OAuthFlowManager, ReqwestOAuthHttp, load_servers_config,
};
use toolgate_store::StoreFactory;
use toolgate_workflow::{Activity, ActivityWorker, InProcessWorkflowEngine, RedisWorkflowEngine};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber, honouring `RUST_LOG` and defaulting to
/// `info`. Later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Fully wired tool subsystem.
pub struct Toolgate {
    settings: Settings,
    tools: Arc<ToolService>,
    connections: Arc<McpConnectionManager>,
    in_process: Option<Arc<InProcessWorkflowEngine>>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Toolgate {
    /// Load `.env` and `TOOLGATE_*` settings, then build.
    pub async fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let settings = Settings::from_env().context("invalid TOOLGATE_* settings")?;
        Self::build(settings).await
    }

    pub async fn build(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let stores = StoreFactory::build(&settings)
            .await
            .context("failed to open stores")?;

        let registry = Arc::new(McpToolRegistry::new(
            Arc::clone(&stores.tools),
            Arc::clone(&stores.servers),
        ));
        let connections = Arc::new(McpConnectionManager::new(
            Arc::new(DefaultMcpClientFactory::new(settings.mcp_call_timeout())),
            registry,
            ConnectionStore::new(settings.connection_capacity, settings.connection_idle()),
            settings.mcp_call_timeout(),
        ));
        let oauth = Arc::new(OAuthFlowManager::new(
            Arc::new(ReqwestOAuthHttp::new(settings.oauth_http_timeout())?),
            Arc::clone(&stores.tokens),
            Arc::clone(&stores.flows),
        ));
        let mcp = Arc::new(McpToolsService::new(
            Arc::clone(&connections),
            oauth,
            settings.oauth_redirect_uri.clone(),
        ));

        let plugged = Arc::new(PluggedToolsRegistry::new(Arc::clone(&stores.tools)));
        let (engine, in_process) = workflow_engine(&settings).await?;
        let adapters: Vec<Arc<dyn PluggableToolAdapter>> = match engine {
            Some(engine) => {
                let executor = Arc::new(WorkflowToolExecutor::new(
                    engine,
                    settings.workflow_run_timeout(),
                ));
                let client_side = ClientSideToolAdapter::new(Arc::clone(&plugged), executor);
                vec![Arc::new(client_side) as Arc<dyn PluggableToolAdapter>]
            }
            None => vec![Arc::new(NoOpAdapter) as Arc<dyn PluggableToolAdapter>],
        };

        let tools = Arc::new(ToolService::new(
            Arc::new(NativeToolRegistry::with_builtins()),
            Arc::clone(&mcp),
            Arc::new(AdapterChain::new(adapters)),
            plugged,
        ));

        if settings.mcp_tools_enabled {
            load_configured(&settings, &mcp).await?;
        }

        tracing::info!(
            store = ?settings.store,
            workflow = ?settings.workflow,
            "Toolgate ready"
        );
        Ok(Self {
            settings,
            tools,
            connections,
            in_process,
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        })
    }

    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    pub const fn tools(&self) -> &Arc<ToolService> {
        &self.tools
    }

    /// Serve `task_queues` from inside this process. Only available with the
    /// in-process workflow backend.
    pub fn spawn_worker(&self, activity: Arc<dyn Activity>, task_queues: Vec<String>) -> Result<()> {
        let Some(engine) = &self.in_process else {
            bail!("in-process workers need TOOLGATE_WORKFLOW=in-process");
        };
        let worker = ActivityWorker::new(
            Arc::clone(engine) as Arc<dyn WorkQueue>,
            activity,
            task_queues,
        );
        let handle = tokio::spawn(worker.run(self.cancel.clone()));
        self.workers
            .lock()
            .map_err(|_| anyhow::anyhow!("worker list poisoned"))?
            .push(handle);
        Ok(())
    }

    /// Close every live MCP client, then stop in-process workers.
    pub async fn shutdown(&self) {
        self.connections.shutdown().await;
        self.cancel.cancel();
        let handles = self
            .workers
            .lock()
            .map(|mut workers| std::mem::take(&mut *workers))
            .unwrap_or_default();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Worker task ended abnormally");
            }
        }
        tracing::info!("Toolgate stopped");
    }
}

async fn workflow_engine(
    settings: &Settings,
) -> Result<(Option<Arc<dyn WorkflowEngine>>, Option<Arc<InProcessWorkflowEngine>>)> {
    match settings.workflow {
        WorkflowBackend::Disabled => Ok((None, None)),
        WorkflowBackend::InProcess => {
            let engine = Arc::new(InProcessWorkflowEngine::new());
            Ok((Some(Arc::clone(&engine) as Arc<dyn WorkflowEngine>), Some(engine)))
        }
        WorkflowBackend::Redis => {
            let url = settings
                .redis_url
                .as_deref()
                .context("TOOLGATE_REDIS_URL is required for the redis workflow backend")?;
            let keyspace = Keyspace::new(settings.env.clone(), settings.app_name.clone());
            let engine = RedisWorkflowEngine::connect(url, &keyspace).await?;
            Ok((Some(Arc::new(engine) as Arc<dyn WorkflowEngine>), None))
        }
    }
}

async fn load_configured(settings: &Settings, mcp: &McpToolsService) -> Result<()> {
    let Some(path) = settings.mcp_servers_config.as_deref() else {
        tracing::warn!("MCP tools enabled but TOOLGATE_MCP_SERVERS_CONFIG is not set");
        return Ok(());
    };
    let config = load_servers_config(path).await?;
    let connected = mcp
        .load_configured_servers(&RequestContext::anonymous(), &config)
        .await;
    tracing::info!(
        connected,
        configured = config.mcp_servers.len(),
        "Configured MCP servers loaded"
    );
    Ok(())
}
