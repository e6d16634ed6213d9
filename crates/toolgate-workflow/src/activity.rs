//! The work a client-side worker performs for each unit.

use async_trait::async_trait;
use toolgate_core::PluggedToolRequest;

/// One attempt at running a client-side tool.
#[async_trait]
pub trait Activity: Send + Sync {
    async fn run(&self, request: &PluggedToolRequest) -> anyhow::Result<String>;
}

/// Stand-in activity that acknowledges every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderActivity;

impl PlaceholderActivity {
    pub const RESPONSE: &'static str = "Executed Successfully";
}

#[async_trait]
impl Activity for PlaceholderActivity {
    async fn run(&self, request: &PluggedToolRequest) -> anyhow::Result<String> {
        tracing::info!(
            tool = %request.name,
            loop_id = request.loop_id.as_deref().unwrap_or("-"),
            "Running client-side tool"
        );
        Ok(Self::RESPONSE.to_string())
    }
}
