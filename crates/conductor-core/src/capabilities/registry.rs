//! Capability registry
//!
//! Builds one catalog out of remote tools, the caller's saved workflows and
//! the built-in tools, and caches it per caller for a TTL. Concurrent callers
//! for the same user during a rebuild wait for that rebuild instead of
//! starting their own; other users are not held up by it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio::time::Instant;

use crate::config::{RuntimeSettings, DEFAULT_CAPABILITY_TTL};
use crate::logging::{Logger, NoOpLogger};
use crate::mcp::RegisteredTool;
use crate::{log_info, log_warn};
use super::categorizer::{Categorizer, KeywordCategorizer};
use super::executors::{BuiltinExecutor, RemoteToolExecutor, WorkflowExecutor};
use super::sources::{BuiltinTool, RemoteToolSource, WorkflowSource, WorkflowSummary};
use super::types::{CallContext, Capability, CapabilityCatalog, CapabilitySource};

/// Capability id of a saved workflow
pub fn workflow_capability_id(workflow_id: &str) -> String {
    format!("workflow:{}", workflow_id)
}

/// Capability id of a built-in tool
pub fn builtin_capability_id(name: &str) -> String {
    format!("built-in:{}", name)
}

struct CachedCatalog {
    built_at: Instant,
    catalog: Arc<CapabilityCatalog>,
}

/// One user's catalog; empty while its build is in flight
type CacheSlot = Arc<OnceCell<CachedCatalog>>;

/// Cached, unified capability catalog
pub struct CapabilityRegistry {
    remote: Option<Arc<dyn RemoteToolSource>>,
    workflows: Option<Arc<dyn WorkflowSource>>,
    builtins: Vec<Arc<dyn BuiltinTool>>,
    categorizer: Arc<dyn Categorizer>,
    ttl: Duration,
    // Keyed by user: executable workflows differ per caller
    cache: Mutex<HashMap<Option<String>, CacheSlot>>,
    logger: Arc<dyn Logger>,
}

impl CapabilityRegistry {
    /// Create an empty registry with the default TTL and categorizer
    pub fn new() -> Self {
        Self {
            remote: None,
            workflows: None,
            builtins: Vec::new(),
            categorizer: Arc::new(KeywordCategorizer::new()),
            ttl: DEFAULT_CAPABILITY_TTL,
            cache: Mutex::new(HashMap::new()),
            logger: Arc::new(NoOpLogger),
        }
    }

    /// Create an empty registry using the configured catalog TTL
    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        Self::new().with_ttl(settings.capability_ttl)
    }

    /// Add the remote tool source (usually the connection registry)
    pub fn with_remote_tools(mut self, source: Arc<dyn RemoteToolSource>) -> Self {
        self.remote = Some(source);
        self
    }

    /// Add the saved-workflow source
    pub fn with_workflows(mut self, source: Arc<dyn WorkflowSource>) -> Self {
        self.workflows = Some(source);
        self
    }

    /// Add a built-in tool
    pub fn with_builtin(mut self, tool: Arc<dyn BuiltinTool>) -> Self {
        self.builtins.push(tool);
        self
    }

    /// Replace the categorizer
    pub fn with_categorizer(mut self, categorizer: Arc<dyn Categorizer>) -> Self {
        self.categorizer = categorizer;
        self
    }

    /// Set the cache TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the logger
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Cache TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current catalog, rebuilt when older than the TTL
    pub async fn get_available_capabilities(&self, ctx: &CallContext) -> Arc<CapabilityCatalog> {
        let slot = self.slot_for(ctx);
        let entry = slot
            .get_or_init(|| async {
                CachedCatalog {
                    catalog: Arc::new(self.build(ctx).await),
                    built_at: Instant::now(),
                }
            })
            .await;
        Arc::clone(&entry.catalog)
    }

    /// Fresh or in-flight slot for the caller, replacing an expired one
    fn slot_for(&self, ctx: &CallContext) -> CacheSlot {
        let now = Instant::now();
        let ttl = self.ttl;
        let live = |slot: &CacheSlot| slot.get().map_or(true, |entry| now.duration_since(entry.built_at) < ttl);

        let mut cache = self.cache.lock();
        if let Some(slot) = cache.get(&ctx.user_id).filter(|slot| live(*slot)) {
            return Arc::clone(slot);
        }
        cache.retain(|_, slot| live(slot));
        let slot = CacheSlot::default();
        cache.insert(ctx.user_id.clone(), Arc::clone(&slot));
        slot
    }

    /// Look up one capability in the current catalog
    pub async fn get_capability_by_id(&self, id: &str, ctx: &CallContext) -> Option<Capability> {
        self.get_available_capabilities(ctx).await.get(id).cloned()
    }

    /// Capabilities whose category contains `category`
    pub async fn get_capabilities_by_category(&self, category: &str, ctx: &CallContext) -> Vec<Capability> {
        self.get_available_capabilities(ctx)
            .await
            .by_category(category)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Drop every cached catalog
    pub async fn invalidate(&self) {
        self.cache.lock().clear();
    }

    #[cfg(test)]
    fn cached_users(&self) -> Vec<Option<String>> {
        let mut users: Vec<_> = self.cache.lock().keys().cloned().collect();
        users.sort();
        users
    }

    async fn build(&self, ctx: &CallContext) -> CapabilityCatalog {
        let (remote, workflows) = tokio::join!(self.remote_capabilities(), self.workflow_capabilities(ctx));

        let mut capabilities = remote;
        capabilities.extend(workflows);
        capabilities.extend(self.builtins.iter().map(|tool| self.wrap_builtin(tool)));

        log_info!(self.logger, "[CapabilityRegistry] Built catalog with {} capabilities", capabilities.len());
        CapabilityCatalog::new(capabilities)
    }

    async fn remote_capabilities(&self) -> Vec<Capability> {
        let Some(source) = &self.remote else {
            return Vec::new();
        };
        match source.remote_tools().await {
            Ok(tools) => tools.into_iter().map(|t| self.wrap_remote(source, t)).collect(),
            Err(e) => {
                log_warn!(self.logger, "[CapabilityRegistry] Remote tools unavailable: {}", e);
                Vec::new()
            }
        }
    }

    async fn workflow_capabilities(&self, ctx: &CallContext) -> Vec<Capability> {
        let Some(source) = &self.workflows else {
            return Vec::new();
        };
        match source.executable_workflows(ctx.user_id.as_deref()).await {
            Ok(workflows) => workflows
                .into_iter()
                .map(|w| self.wrap_workflow(source, w))
                .collect(),
            Err(e) => {
                log_warn!(self.logger, "[CapabilityRegistry] Workflows unavailable: {}", e);
                Vec::new()
            }
        }
    }

    fn wrap_remote(&self, source: &Arc<dyn RemoteToolSource>, registered: RegisteredTool) -> Capability {
        let RegisteredTool { id, server, tool } = registered;
        let origin = CapabilitySource::Remote {
            server: server.clone(),
            tool: tool.name.clone(),
        };
        Capability {
            category: self.categorizer.categorize(&tool.name, &tool.description, &origin),
            kind: origin.kind(),
            executor: Some(Arc::new(RemoteToolExecutor::new(Arc::clone(source), server, tool.name.clone()))),
            id,
            name: tool.name,
            description: tool.description,
            input_schema: Some(tool.input_schema),
            source: origin,
        }
    }

    fn wrap_workflow(&self, source: &Arc<dyn WorkflowSource>, workflow: WorkflowSummary) -> Capability {
        let origin = CapabilitySource::Workflow {
            workflow_id: workflow.id.clone(),
        };
        Capability {
            id: workflow_capability_id(&workflow.id),
            category: self.categorizer.categorize(&workflow.name, &workflow.description, &origin),
            kind: origin.kind(),
            executor: Some(Arc::new(WorkflowExecutor::new(Arc::clone(source), workflow.id))),
            name: workflow.name,
            description: workflow.description,
            input_schema: workflow.input_schema,
            source: origin,
        }
    }

    fn wrap_builtin(&self, tool: &Arc<dyn BuiltinTool>) -> Capability {
        let origin = CapabilitySource::Builtin {
            toolkit: tool.toolkit().to_string(),
            tool: tool.name().to_string(),
        };
        Capability {
            id: builtin_capability_id(tool.name()),
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            kind: origin.kind(),
            category: self.categorizer.categorize(tool.name(), tool.description(), &origin),
            input_schema: Some(tool.input_schema()),
            executor: Some(Arc::new(BuiltinExecutor::new(Arc::clone(tool)))),
            source: origin,
        }
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::CapabilityKind;
    use crate::testing::{CountingRemoteSource, CountingWorkflowSource, RecordingBuiltin};
    use crate::types::ToolDescriptor;
    use serde_json::json;

    fn registry(remote: &Arc<CountingRemoteSource>, workflows: &Arc<CountingWorkflowSource>) -> CapabilityRegistry {
        CapabilityRegistry::new()
            .with_remote_tools(Arc::clone(remote) as Arc<dyn RemoteToolSource>)
            .with_workflows(Arc::clone(workflows) as Arc<dyn WorkflowSource>)
            .with_builtin(Arc::new(RecordingBuiltin::new("chart", "chart")))
    }

    fn ads_remote() -> Arc<CountingRemoteSource> {
        Arc::new(CountingRemoteSource::new(vec![
            ("google_ads", ToolDescriptor::new("list_campaigns", "List campaigns")),
            ("acme", ToolDescriptor::new("search", "Search ACME")),
        ]))
    }

    fn workflows() -> Arc<CountingWorkflowSource> {
        Arc::new(CountingWorkflowSource::new(vec![WorkflowSummary {
            id: "wf-1".into(),
            name: "Weekly traffic report".into(),
            description: "Summarize analytics sessions".into(),
            input_schema: None,
        }]))
    }

    #[tokio::test]
    async fn test_catalog_combines_sources() {
        let remote = ads_remote();
        let workflows = workflows();
        let registry = registry(&remote, &workflows);

        let catalog = registry.get_available_capabilities(&CallContext::new()).await;
        let ids: Vec<&str> = catalog.all().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["google_ads__list_campaigns", "acme__search", "workflow:wf-1", "built-in:chart"]
        );

        let ads = catalog.get("google_ads__list_campaigns").unwrap();
        assert_eq!(ads.kind, CapabilityKind::RemoteTool);
        assert_eq!(ads.category, "google-ads");
        assert_eq!(catalog.get("acme__search").unwrap().category, "acme");
        assert_eq!(catalog.get("workflow:wf-1").unwrap().category, "analytics");
        assert_eq!(catalog.get("built-in:chart").unwrap().category, "chart");
        assert!(catalog.all().iter().all(Capability::is_executable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_within_ttl_returns_same_snapshot() {
        let remote = ads_remote();
        let workflows = workflows();
        let registry = registry(&remote, &workflows).with_ttl(Duration::from_secs(30));
        let ctx = CallContext::new();

        let first = registry.get_available_capabilities(&ctx).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        let second = registry.get_available_capabilities(&ctx).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(remote.fetches(), 1);
        assert_eq!(workflows.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_cache_rebuilds_once_under_concurrency() {
        let remote = Arc::new(
            CountingRemoteSource::new(vec![("acme", ToolDescriptor::new("search", ""))])
                .with_delay(Duration::from_millis(100)),
        );
        let workflows = workflows();
        let registry = registry(&remote, &workflows).with_ttl(Duration::from_secs(30));
        let ctx = CallContext::new();

        let first = registry.get_available_capabilities(&ctx).await;
        tokio::time::advance(Duration::from_secs(31)).await;

        let catalogs = futures::future::join_all((0..5).map(|_| registry.get_available_capabilities(&ctx))).await;
        assert_eq!(remote.fetches(), 2);
        assert!(!Arc::ptr_eq(&first, &catalogs[0]));
        assert!(catalogs.iter().all(|c| Arc::ptr_eq(c, &catalogs[0])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebuild_for_one_user_does_not_block_others() {
        let remote = Arc::new(
            CountingRemoteSource::new(vec![("acme", ToolDescriptor::new("search", ""))])
                .with_delay(Duration::from_secs(20)),
        );
        let workflows = workflows();
        let registry = registry(&remote, &workflows).with_ttl(Duration::from_secs(300));
        let bob = CallContext::for_user("bob");
        let alice = CallContext::for_user("alice");

        let cached = registry.get_available_capabilities(&bob).await;

        let (alice_catalog, bob_catalog) = tokio::join!(
            registry.get_available_capabilities(&alice),
            tokio::time::timeout(Duration::from_secs(1), registry.get_available_capabilities(&bob))
        );

        let bob_catalog = bob_catalog.expect("bob's cached catalog is served during alice's rebuild");
        assert!(Arc::ptr_eq(&cached, &bob_catalog));
        assert!(!Arc::ptr_eq(&cached, &alice_catalog));
        assert_eq!(remote.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_evicted() {
        let remote = ads_remote();
        let workflows = workflows();
        let registry = registry(&remote, &workflows).with_ttl(Duration::from_secs(30));

        registry.get_available_capabilities(&CallContext::for_user("a")).await;
        registry.get_available_capabilities(&CallContext::for_user("b")).await;
        tokio::time::advance(Duration::from_secs(31)).await;
        registry.get_available_capabilities(&CallContext::for_user("c")).await;

        assert_eq!(registry.cached_users(), vec![Some("c".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_from_settings() {
        let remote = ads_remote();
        let workflows = workflows();
        let settings = RuntimeSettings::from_lookup(|key| {
            (key == "CONDUCTOR_CAPABILITY_TTL_SECS").then(|| "5".to_string())
        });
        let registry = CapabilityRegistry::from_settings(&settings)
            .with_remote_tools(Arc::clone(&remote) as Arc<dyn RemoteToolSource>)
            .with_workflows(Arc::clone(&workflows) as Arc<dyn WorkflowSource>);
        assert_eq!(registry.ttl(), Duration::from_secs(5));
        let ctx = CallContext::new();

        registry.get_available_capabilities(&ctx).await;
        tokio::time::advance(Duration::from_secs(4)).await;
        registry.get_available_capabilities(&ctx).await;
        assert_eq!(remote.fetches(), 1);

        // Well inside the 30 s default, past the configured 5 s
        tokio::time::advance(Duration::from_secs(2)).await;
        registry.get_available_capabilities(&ctx).await;
        assert_eq!(remote.fetches(), 2);
    }

    #[tokio::test]
    async fn test_failing_source_is_skipped() {
        let remote = Arc::new(CountingRemoteSource::new(vec![]).failing());
        let workflows = workflows();
        let registry = registry(&remote, &workflows);

        let catalog = registry.get_available_capabilities(&CallContext::new()).await;
        let ids: Vec<&str> = catalog.all().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["workflow:wf-1", "built-in:chart"]);
    }

    #[tokio::test]
    async fn test_lookups() {
        let remote = ads_remote();
        let workflows = workflows();
        let registry = registry(&remote, &workflows);
        let ctx = CallContext::new();

        assert!(registry.get_capability_by_id("acme__search", &ctx).await.is_some());
        assert!(registry.get_capability_by_id("acme__missing", &ctx).await.is_none());

        // Substring, case-insensitive
        let ads = registry.get_capabilities_by_category("ADS", &ctx).await;
        assert_eq!(ads.len(), 1);
        assert_eq!(ads[0].id, "google_ads__list_campaigns");
    }

    #[tokio::test]
    async fn test_executors_dispatch_by_kind() {
        let remote = ads_remote();
        let workflows = workflows();
        let builtin = Arc::new(RecordingBuiltin::new("chart", "chart"));
        let registry = CapabilityRegistry::new()
            .with_remote_tools(Arc::clone(&remote) as Arc<dyn RemoteToolSource>)
            .with_workflows(Arc::clone(&workflows) as Arc<dyn WorkflowSource>)
            .with_builtin(Arc::clone(&builtin) as Arc<dyn BuiltinTool>);
        let ctx = CallContext::for_user("u1");
        let catalog = registry.get_available_capabilities(&ctx).await;

        let run = |id: &str| catalog.get(id).and_then(|c| c.executor.clone()).unwrap();

        let result = run("acme__search").execute(json!({ "q": "x" }), &ctx).await.unwrap();
        assert_eq!(result, json!({ "q": "x" }));
        assert_eq!(remote.calls(), vec![("acme".to_string(), "search".to_string(), json!({ "q": "x" }))]);

        run("workflow:wf-1").execute(json!({}), &ctx).await.unwrap();
        assert_eq!(workflows.executions(), vec!["wf-1".to_string()]);
        assert_eq!(workflows.last_user().as_deref(), Some("u1"));

        run("built-in:chart").execute(json!({ "a": 1 }), &ctx).await.unwrap();
        run("built-in:chart").execute(json!({ "a": 2 }), &ctx).await.unwrap();
        let calls = builtin.calls();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].0, calls[1].0, "each call gets a fresh call id");
    }
}
