//! Ordered pluggable-adapter chain: the first adapter to claim a tool owns it.

use std::sync::Arc;

use async_trait::async_trait;
use toolgate_core::{
    PluggableToolAdapter, PluggableToolDefinition, PluggedToolRequest, RequestContext, ToolError,
};

/// A tool together with the adapter that claimed it.
#[derive(Clone)]
pub struct ClaimedTool {
    adapter: Arc<dyn PluggableToolAdapter>,
    pub tool: PluggableToolDefinition,
}

impl ClaimedTool {
    /// Run `request` on the claiming adapter.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        request: PluggedToolRequest,
    ) -> Result<Option<String>, ToolError> {
        self.adapter.execute(ctx, &self.tool, request).await
    }
}

impl std::fmt::Debug for ClaimedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimedTool").field("tool", &self.tool).finish()
    }
}

/// Adapters in priority order.
///
/// Each adapter is asked at most once per resolution, and nobody is asked
/// after a claim succeeds.
#[derive(Default, Clone)]
pub struct AdapterChain {
    adapters: Vec<Arc<dyn PluggableToolAdapter>>,
}

impl AdapterChain {
    pub fn new(adapters: Vec<Arc<dyn PluggableToolAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub async fn claim(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Option<ClaimedTool>, ToolError> {
        for adapter in &self.adapters {
            if let Some(tool) = adapter.try_claim(ctx, name).await? {
                return Ok(Some(ClaimedTool {
                    adapter: Arc::clone(adapter),
                    tool,
                }));
            }
        }
        Ok(None)
    }

    /// Claim `request.name` and execute it once on the claiming adapter.
    pub async fn dispatch(
        &self,
        ctx: &RequestContext,
        request: PluggedToolRequest,
    ) -> Result<Option<String>, ToolError> {
        let claimed = self
            .claim(ctx, &request.name)
            .await?
            .ok_or_else(|| no_adapter(&request.name))?;
        claimed.execute(ctx, request).await
    }
}

fn no_adapter(name: &str) -> ToolError {
    tracing::warn!(tool = name, "No tool plugged into the adapter chain");
    ToolError::NoAdapter(name.to_string())
}

/// Adapter installed when pluggable execution is disabled.
pub struct NoOpAdapter;

#[async_trait]
impl PluggableToolAdapter for NoOpAdapter {
    async fn try_claim(
        &self,
        _ctx: &RequestContext,
        _name: &str,
    ) -> Result<Option<PluggableToolDefinition>, ToolError> {
        Ok(None)
    }

    async fn execute(
        &self,
        _ctx: &RequestContext,
        _tool: &PluggableToolDefinition,
        _request: PluggedToolRequest,
    ) -> Result<Option<String>, ToolError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use serde_json::json;

    mock! {
        Adapter {}

        #[async_trait]
        impl PluggableToolAdapter for Adapter {
            async fn try_claim(
                &self,
                ctx: &RequestContext,
                name: &str,
            ) -> Result<Option<PluggableToolDefinition>, ToolError>;

            async fn execute(
                &self,
                ctx: &RequestContext,
                tool: &PluggableToolDefinition,
                request: PluggedToolRequest,
            ) -> Result<Option<String>, ToolError>;
        }
    }

    fn adapter(mock: MockAdapter) -> Arc<dyn PluggableToolAdapter> {
        Arc::new(mock)
    }

    fn request(name: &str) -> PluggedToolRequest {
        PluggedToolRequest {
            name: name.to_string(),
            arguments: "{}".to_string(),
            loop_id: None,
        }
    }

    fn definition(name: &str) -> PluggableToolDefinition {
        PluggableToolDefinition::new(name, "test tool", json!({"type": "object"}))
    }

    #[tokio::test]
    async fn test_routes_to_first_claiming_adapter_once() {
        let mut a = MockAdapter::new();
        a.expect_try_claim().times(1).returning(|_, _| Ok(None));
        a.expect_execute().never();

        let mut b = MockAdapter::new();
        b.expect_try_claim()
            .withf(|_, name| name == "x")
            .times(1)
            .returning(|_, name| Ok(Some(definition(name))));
        b.expect_execute()
            .times(1)
            .returning(|_, tool, _| Ok(Some(format!("ran {}", tool.name))));

        let chain = AdapterChain::new(vec![adapter(a), adapter(b)]);
        let out = chain
            .dispatch(&RequestContext::anonymous(), request("x"))
            .await
            .unwrap();
        assert_eq!(out.as_deref(), Some("ran x"));
    }

    #[tokio::test]
    async fn test_later_adapters_not_asked_after_claim() {
        let mut a = MockAdapter::new();
        a.expect_try_claim()
            .times(1)
            .returning(|_, name| Ok(Some(definition(name))));
        a.expect_execute().times(1).returning(|_, _, _| Ok(None));

        let mut b = MockAdapter::new();
        b.expect_try_claim().never();
        b.expect_execute().never();

        let chain = AdapterChain::new(vec![adapter(a), adapter(b)]);
        let out = chain
            .dispatch(&RequestContext::anonymous(), request("x"))
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_unclaimed_tool_is_no_adapter_error() {
        let mut a = MockAdapter::new();
        a.expect_try_claim().returning(|_, _| Ok(None));
        a.expect_execute().never();

        let chain = AdapterChain::new(vec![adapter(a), Arc::new(NoOpAdapter)]);
        let err = chain
            .dispatch(&RequestContext::anonymous(), request("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NoAdapter(_)));
        assert_eq!(err.to_string(), "No adapter available for tool missing");
    }

    #[tokio::test]
    async fn test_claim_errors_propagate() {
        let mut a = MockAdapter::new();
        a.expect_try_claim()
            .returning(|_, _| Err(ToolError::Validation("no tenant".to_string())));

        let chain = AdapterChain::new(vec![adapter(a)]);
        let err = chain
            .claim(&RequestContext::anonymous(), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[tokio::test]
    async fn test_noop_never_claims() {
        let noop = NoOpAdapter;
        let ctx = RequestContext::anonymous();
        assert!(noop.try_claim(&ctx, "anything").await.unwrap().is_none());
        let out = noop
            .execute(&ctx, &definition("anything"), request("anything"))
            .await
            .unwrap();
        assert!(out.is_none());

        let chain = AdapterChain::new(vec![Arc::new(NoOpAdapter) as Arc<dyn PluggableToolAdapter>]);
        assert!(chain.claim(&ctx, "anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claimed_tool_executes_without_reclaiming() {
        let mut a = MockAdapter::new();
        a.expect_try_claim()
            .times(1)
            .returning(|_, name| Ok(Some(definition(name))));
        a.expect_execute()
            .times(2)
            .returning(|_, tool, request| Ok(Some(format!("{}:{}", tool.name, request.arguments))));

        let chain = AdapterChain::new(vec![adapter(a)]);
        let ctx = RequestContext::anonymous();
        let claimed = chain.claim(&ctx, "x").await.unwrap().unwrap();
        assert_eq!(claimed.tool.name, "x");
        assert_eq!(
            claimed.execute(&ctx, request("x")).await.unwrap().as_deref(),
            Some("x:{}")
        );
        assert!(claimed.execute(&ctx, request("x")).await.unwrap().is_some());
    }
}
