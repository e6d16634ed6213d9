//! Cache key layout shared by every storage backend.
//!
//! Keys follow `<env>:<app>[:<tenant>]:<category>:<identifier>`. Instances
//! sharing a distributed cache rely on this layout, so it must not change.

use crate::context::RequestContext;
use crate::domain::ToolKind;

/// What a key points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCategory {
    Tool(ToolKind),
    McpServer,
    McpAuthToken,
    McpAuthFlow,
}

impl KeyCategory {
    fn push_segment(self, key: &mut String) {
        match self {
            Self::Tool(kind) => {
                key.push_str("tool:");
                key.push_str(kind.as_str());
            }
            Self::McpServer => key.push_str("mcp-server"),
            Self::McpAuthToken => key.push_str("mcp-auth-token"),
            Self::McpAuthFlow => key.push_str("mcp-auth-flow"),
        }
    }
}

/// Environment and application prefix for all keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    env: String,
    app_name: String,
}

impl Keyspace {
    pub fn new(env: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            env: env.into(),
            app_name: app_name.into(),
        }
    }

    /// Build a key, inserting the tenant segment only when one is present.
    pub fn key(&self, tenant: Option<&str>, category: KeyCategory, id: &str) -> String {
        let mut key = String::with_capacity(self.env.len() + self.app_name.len() + id.len() + 32);
        key.push_str(&self.env);
        key.push(':');
        key.push_str(&self.app_name);
        key.push(':');
        if let Some(tenant) = tenant.filter(|t| !t.is_empty()) {
            key.push_str(tenant);
            key.push(':');
        }
        category.push_segment(&mut key);
        key.push(':');
        key.push_str(id);
        key
    }

    pub fn tool_key(&self, ctx: &RequestContext, kind: ToolKind, name: &str) -> String {
        self.key(ctx.tenant(), KeyCategory::Tool(kind), name)
    }

    pub fn server_key(&self, ctx: &RequestContext, server_identifier: &str) -> String {
        self.key(ctx.tenant(), KeyCategory::McpServer, server_identifier)
    }

    pub fn token_key(&self, ctx: &RequestContext, server_identifier: &str) -> String {
        self.key(ctx.tenant(), KeyCategory::McpAuthToken, server_identifier)
    }

    /// Flow state is looked up by the callback, which carries no tenant.
    pub fn flow_key(&self, state: &str) -> String {
        self.key(None, KeyCategory::McpAuthFlow, state)
    }

    /// Prefix for ad-hoc keys (workflow queues and results).
    pub fn prefix(&self) -> String {
        format!("{}:{}", self.env, self.app_name)
    }
}
