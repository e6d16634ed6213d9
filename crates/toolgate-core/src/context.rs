//! Explicit request context threaded through every registry and store call.

use serde::{Deserialize, Serialize};

/// Per-request context.
///
/// The tenant id namespaces every registry, server and token key. When it is
/// absent, keys fall back to the tenant-less namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Acting tenant/user, if any.
    pub tenant_id: Option<String>,
    /// Agent loop this call belongs to, used to tag workflow ids.
    pub loop_id: Option<String>,
    /// Whether the caller can follow an authorization redirect.
    pub accepts_redirects: bool,
    /// Callback URI to use when an OAuth flow has to be (re)started.
    pub redirect_uri: Option<String>,
}

impl RequestContext {
    /// Context with no tenant, no loop and no redirect capability.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            tenant_id: None,
            loop_id: None,
            accepts_redirects: false,
            redirect_uri: None,
        }
    }

    /// Context acting on behalf of `tenant_id`.
    #[must_use]
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Self::anonymous()
        }
    }

    #[must_use]
    pub fn with_loop_id(mut self, loop_id: impl Into<String>) -> Self {
        self.loop_id = Some(loop_id.into());
        self
    }

    /// Mark the caller as interactive: authorization failures become redirects.
    #[must_use]
    pub fn with_redirect(mut self, redirect_uri: impl Into<String>) -> Self {
        self.accepts_redirects = true;
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Tenant id, treating an empty string as absent.
    pub fn tenant(&self) -> Option<&str> {
        self.tenant_id.as_deref().filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tenant_is_absent() {
        let ctx = RequestContext::for_tenant("");
        assert_eq!(ctx.tenant(), None);
        assert_eq!(RequestContext::for_tenant("u1").tenant(), Some("u1"));
    }

    #[test]
    fn test_with_redirect_marks_interactive() {
        let ctx = RequestContext::anonymous().with_redirect("https://app/callback");
        assert!(ctx.accepts_redirects);
        assert_eq!(ctx.redirect_uri.as_deref(), Some("https://app/callback"));
    }
}
