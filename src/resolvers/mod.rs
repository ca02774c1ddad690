//! Resolver phases: registered functions that pick a stage's next phase
//! instead of running an agent.
//!
//! A resolver returns `Some(phase_name)` to move the stage, or `None` to
//! leave it where it is until the next evaluation.

use anyhow::Result;
use async_trait::async_trait;
use serde_yaml::Mapping;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::pipeline::DONE_TARGET;
use crate::review::CodeHostAdapter;
use crate::store::{Record, keys};

/// Name of the built-in pull request resolver.
pub const PR_STATUS_RESOLVER: &str = "pr-status";

/// Context key naming the phase `pr-status` routes to when review comments are open.
pub const FEEDBACK_PHASE_ENV: &str = "feedback_phase";

/// The stage data a resolver sees.
#[derive(Debug, Clone, Default)]
pub struct ResolverStage {
    pub id: String,
    pub status: String,
    pub pr_url: Option<String>,
    /// Every frontmatter field, for resolvers that route on custom data.
    pub fields: Mapping,
}

impl ResolverStage {
    pub fn from_record(id: &str, record: &Record) -> Self {
        Self {
            id: id.to_string(),
            status: record.get_str(keys::STATUS).unwrap_or_default().to_string(),
            pr_url: record.get_str(keys::PR_URL).map(str::to_string),
            fields: record.fields.clone(),
        }
    }
}

/// Environment handed to resolvers.
#[derive(Clone, Default)]
pub struct ResolverContext {
    pub env: HashMap<String, String>,
    pub code_host: Option<Arc<dyn CodeHostAdapter>>,
}

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, stage: &ResolverStage, ctx: &ResolverContext)
    -> Result<Option<String>>;
}

/// Adapts a plain closure into a `Resolver`.
pub struct FnResolver<F>(pub F);

#[async_trait]
impl<F> Resolver for FnResolver<F>
where
    F: Fn(&ResolverStage, &ResolverContext) -> Result<Option<String>> + Send + Sync,
{
    async fn resolve(
        &self,
        stage: &ResolverStage,
        ctx: &ResolverContext,
    ) -> Result<Option<String>> {
        (self.0)(stage, ctx)
    }
}

/// Routes on pull request state: merged → `Done`, open review threads → the
/// feedback phase named in the context, otherwise stay put.
pub struct PrStatusResolver;

#[async_trait]
impl Resolver for PrStatusResolver {
    async fn resolve(
        &self,
        stage: &ResolverStage,
        ctx: &ResolverContext,
    ) -> Result<Option<String>> {
        let (Some(adapter), Some(url)) = (ctx.code_host.as_ref(), stage.pr_url.as_deref()) else {
            return Ok(None);
        };

        let status = adapter.get_status(url).await?;
        if status.merged {
            return Ok(Some(DONE_TARGET.to_string()));
        }
        if status.unresolved_thread_count > 0 {
            return Ok(ctx.env.get(FEEDBACK_PHASE_ENV).cloned());
        }
        Ok(None)
    }
}

/// Name → resolver lookup.
#[derive(Default, Clone)]
pub struct ResolverRegistry {
    resolvers: BTreeMap<String, Arc<dyn Resolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in resolvers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(PR_STATUS_RESOLVER, Arc::new(PrStatusResolver));
        registry
    }

    /// Register a resolver, replacing any previous one with the same name.
    pub fn register(&mut self, name: &str, resolver: Arc<dyn Resolver>) {
        self.resolvers.insert(name.to_string(), resolver);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Resolver>> {
        self.resolvers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.resolvers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::PrStatus;

    struct FixedAdapter(PrStatus);

    #[async_trait]
    impl CodeHostAdapter for FixedAdapter {
        async fn get_status(&self, _url: &str) -> Result<PrStatus> {
            Ok(self.0.clone())
        }
    }

    fn ctx_with(status: PrStatus) -> ResolverContext {
        let mut env = HashMap::new();
        env.insert(FEEDBACK_PHASE_ENV.to_string(), "Addressing Comments".to_string());
        ResolverContext {
            env,
            code_host: Some(Arc::new(FixedAdapter(status))),
        }
    }

    fn stage_with_pr() -> ResolverStage {
        ResolverStage {
            id: "STAGE-1".to_string(),
            status: "PR Created".to_string(),
            pr_url: Some("https://github.com/o/r/pull/1".to_string()),
            fields: Mapping::new(),
        }
    }

    #[test]
    fn test_registry_builtins() {
        let registry = ResolverRegistry::with_builtins();
        assert!(registry.contains(PR_STATUS_RESOLVER));
        assert!(!registry.contains("testing-router"));
        assert_eq!(registry.names(), vec![PR_STATUS_RESOLVER]);
    }

    #[tokio::test]
    async fn test_fn_resolver() {
        let mut registry = ResolverRegistry::new();
        registry.register(
            "always-build",
            Arc::new(FnResolver(|_: &ResolverStage, _: &ResolverContext| {
                Ok(Some("Build".to_string()))
            })),
        );
        let resolver = registry.get("always-build").unwrap();
        let next = resolver
            .resolve(&ResolverStage::default(), &ResolverContext::default())
            .await
            .unwrap();
        assert_eq!(next.as_deref(), Some("Build"));
    }

    #[tokio::test]
    async fn test_pr_status_merged() {
        let ctx = ctx_with(PrStatus {
            merged: true,
            unresolved_thread_count: 4,
            state: "MERGED".to_string(),
        });
        let next = PrStatusResolver.resolve(&stage_with_pr(), &ctx).await.unwrap();
        assert_eq!(next.as_deref(), Some(DONE_TARGET));
    }

    #[tokio::test]
    async fn test_pr_status_open_threads() {
        let ctx = ctx_with(PrStatus {
            merged: false,
            unresolved_thread_count: 2,
            state: "OPEN".to_string(),
        });
        let next = PrStatusResolver.resolve(&stage_with_pr(), &ctx).await.unwrap();
        assert_eq!(next.as_deref(), Some("Addressing Comments"));
    }

    #[tokio::test]
    async fn test_pr_status_quiet_pr_stays() {
        let ctx = ctx_with(PrStatus {
            merged: false,
            unresolved_thread_count: 0,
            state: "OPEN".to_string(),
        });
        assert!(PrStatusResolver.resolve(&stage_with_pr(), &ctx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pr_status_without_adapter_or_url() {
        let next = PrStatusResolver
            .resolve(&stage_with_pr(), &ResolverContext::default())
            .await
            .unwrap();
        assert!(next.is_none());

        let ctx = ctx_with(PrStatus {
            merged: true,
            unresolved_thread_count: 0,
            state: "MERGED".to_string(),
        });
        let next = PrStatusResolver
            .resolve(&ResolverStage::default(), &ctx)
            .await
            .unwrap();
        assert!(next.is_none());
    }

    #[test]
    fn test_stage_from_record() {
        let record = Record::parse(
            "---\nid: STAGE-1\nstatus: PR Created\npr_url: https://github.com/o/r/pull/9\n---\n",
        )
        .unwrap();
        let stage = ResolverStage::from_record("STAGE-1", &record);
        assert_eq!(stage.status, "PR Created");
        assert_eq!(stage.pr_url.as_deref(), Some("https://github.com/o/r/pull/9"));
        assert_eq!(stage.fields.len(), 3);
    }
}
