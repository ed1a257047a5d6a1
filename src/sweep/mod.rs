//! Sweepers
//!
//! Out-of-band cleanup of resources left behind by interrupted test runs. Each
//! sweeper lists one resource type; the orchestrator filters by name prefix and
//! deletes matches concurrently. Sweepers run after the sweepers they depend on,
//! and one failing sweeper never stops the others.

use crate::aws::ApiError;
use crate::provider::ResourceContext;
use crate::resource::{lifecycle, registry};
use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Name prefix used by acceptance tests for everything they create
pub const DEFAULT_PREFIX: &str = "tf-acc-test";

/// Default number of concurrent deletions
pub const DEFAULT_CONCURRENCY: usize = 10;

/// One leftover remote resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepResource {
    pub type_name: &'static str,
    /// Remote identifier accepted by the resource's read
    pub id: String,
    /// Name matched against the sweep prefix
    pub name: String,
}

impl SweepResource {
    pub fn new(type_name: &'static str, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name,
            id: id.into(),
            name: name.into(),
        }
    }
}

pub type ListFn = for<'a> fn(&'a ResourceContext) -> BoxFuture<'a, Result<Vec<SweepResource>>>;

/// Lists leftovers of one resource type
#[derive(Clone, Copy)]
pub struct Sweeper {
    pub name: &'static str,
    /// Sweepers that must finish before this one starts
    pub dependencies: &'static [&'static str],
    pub list: ListFn,
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Errors meaning the service is unavailable here, not that sweeping failed
pub fn skip_sweep_error(error: &anyhow::Error) -> bool {
    let Some(api) = error.chain().find_map(|e| e.downcast_ref::<ApiError>()) else {
        return false;
    };
    api.code_equals("UnrecognizedClientException")
        || api.code_equals("InvalidClientTokenId")
        || api.code_equals("UnsupportedOperation")
        || api.message.contains("is not supported in this region")
        || api.message.contains("not available in this region")
        || api.message.contains("Unknown operation")
        || (api.code_equals("RequestError") && api.message.contains("dns error"))
}

/// Order sweepers so every one runs after its dependencies.
///
/// Dependencies that are not in `sweepers` are ignored; a cycle is an error.
pub fn run_order<'a>(sweepers: &[&'a Sweeper]) -> Result<Vec<&'a Sweeper>> {
    let by_name: HashMap<&str, &'a Sweeper> = sweepers.iter().map(|s| (s.name, *s)).collect();
    let mut ordered = Vec::with_capacity(sweepers.len());
    let mut done = BTreeSet::new();
    let mut visiting = BTreeSet::new();

    fn visit<'a>(
        sweeper: &'a Sweeper,
        by_name: &HashMap<&str, &'a Sweeper>,
        done: &mut BTreeSet<&'static str>,
        visiting: &mut BTreeSet<&'static str>,
        ordered: &mut Vec<&'a Sweeper>,
    ) -> Result<()> {
        if done.contains(sweeper.name) {
            return Ok(());
        }
        if !visiting.insert(sweeper.name) {
            bail!("sweeper dependency cycle at {}", sweeper.name);
        }
        for dep in sweeper.dependencies {
            match by_name.get(dep) {
                Some(dep) => visit(*dep, by_name, done, visiting, ordered)?,
                None => tracing::debug!("Sweeper {} dependency {} not selected", sweeper.name, dep),
            }
        }
        visiting.remove(sweeper.name);
        done.insert(sweeper.name);
        ordered.push(sweeper);
        Ok(())
    }

    for sweeper in sweepers {
        visit(sweeper, &by_name, &mut done, &mut visiting, &mut ordered)?;
    }
    Ok(ordered)
}

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub prefix: String,
    pub concurrency: usize,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Outcome of a sweep run
#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    pub deleted: Vec<String>,
    /// Sweepers skipped because the service is unavailable
    pub skipped: Vec<String>,
    pub errors: Vec<String>,
}

impl SweepReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Run sweepers in dependency order
pub async fn run(ctx: &ResourceContext, sweepers: &[&Sweeper], options: &SweepOptions) -> Result<SweepReport> {
    let mut report = SweepReport::default();

    for sweeper in run_order(sweepers)? {
        tracing::info!("Running sweeper {} in {}", sweeper.name, ctx.region);

        let found = match (sweeper.list)(ctx).await {
            Ok(found) => found,
            Err(err) if skip_sweep_error(&err) => {
                tracing::warn!("Skipping {} sweep for {}: {:#}", sweeper.name, ctx.region, err);
                report.skipped.push(sweeper.name.to_string());
                continue;
            }
            Err(err) => {
                tracing::error!("Listing {} failed: {:#}", sweeper.name, err);
                report.errors.push(format!("{}: {:#}", sweeper.name, err));
                continue;
            }
        };

        let matching: Vec<SweepResource> = found
            .into_iter()
            .filter(|r| r.name.starts_with(&options.prefix))
            .collect();
        tracing::info!("{}: {} resources to sweep", sweeper.name, matching.len());

        let results: Vec<(SweepResource, Result<()>)> = stream::iter(matching)
            .map(|r| async move {
                let result = sweep_one(ctx, &r).await;
                (r, result)
            })
            .buffer_unordered(options.concurrency.max(1))
            .collect()
            .await;

        for (r, result) in results {
            match result {
                Ok(()) => report.deleted.push(format!("{} {}", r.type_name, r.id)),
                Err(err) => {
                    tracing::error!("Sweeping {} ({}) failed: {:#}", r.type_name, r.id, err);
                    report.errors.push(format!("{} ({}): {:#}", r.type_name, r.id, err));
                }
            }
        }
    }

    Ok(report)
}

/// Read the resource by id and delete it through the normal delete path
async fn sweep_one(ctx: &ResourceContext, target: &SweepResource) -> Result<()> {
    let resource = registry::new_resource(target.type_name)?;
    let Some(state) = resource
        .read(ctx, &target.id)
        .await
        .with_context(|| format!("reading {} ({})", target.type_name, target.id))?
    else {
        return Ok(());
    };
    tracing::info!("Deleting {} ({})", target.type_name, target.id);
    lifecycle::destroy(resource.as_ref(), ctx, &state).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nothing(_: &ResourceContext) -> BoxFuture<'_, Result<Vec<SweepResource>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    const A: Sweeper = Sweeper { name: "a", dependencies: &["b", "c"], list: nothing };
    const B: Sweeper = Sweeper { name: "b", dependencies: &["c"], list: nothing };
    const C: Sweeper = Sweeper { name: "c", dependencies: &[], list: nothing };

    #[test]
    fn test_dependencies_run_first() {
        let order: Vec<_> = run_order(&[&A, &B, &C]).unwrap().iter().map(|s| s.name).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_missing_dependency_ignored() {
        let order: Vec<_> = run_order(&[&A]).unwrap().iter().map(|s| s.name).collect();
        assert_eq!(order, vec!["a"]);
    }

    #[test]
    fn test_cycle_is_error() {
        const X: Sweeper = Sweeper { name: "x", dependencies: &["y"], list: nothing };
        const Y: Sweeper = Sweeper { name: "y", dependencies: &["x"], list: nothing };
        assert!(run_order(&[&X, &Y]).is_err());
    }

    #[test]
    fn test_skip_errors() {
        let err = anyhow::Error::new(ApiError::new(
            400,
            "UnrecognizedClientException",
            "The security token included in the request is invalid",
        ));
        assert!(skip_sweep_error(&err));
        let err = anyhow::Error::new(ApiError::new(500, "InternalServerException", "boom"));
        assert!(!skip_sweep_error(&err));
    }
}
