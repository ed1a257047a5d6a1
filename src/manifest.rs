//! Resource manifest
//!
//! A YAML document listing the resources to manage, in apply order:
//!
//! ```yaml
//! default_tags:
//!   team: infra
//! resources:
//!   - address: aws_appconfig_extension.main
//!     config:
//!       name: tf-acc-test-1
//!       action_point:
//!         - point: ON_DEPLOYMENT_COMPLETE
//!           action:
//!             - name: notify
//!               role_arn: arn:aws:iam::123456789012:role/appconfig
//!               uri: arn:aws:sns:us-west-2:123456789012:deployments
//! ```
//!
//! Resources present in state but missing from the manifest are destroyed.

use crate::provider::ResourceContext;
use crate::resource::lifecycle::{self, PlanAction};
use crate::resource::registry;
use crate::state::{Address, StateFile};
use crate::tags::Tags;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestResource {
    pub address: Address,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Overrides the provider's default tags
    #[serde(default)]
    pub default_tags: Option<Tags>,
    #[serde(default)]
    pub resources: Vec<ManifestResource>,
}

/// One planned change
#[derive(Debug, Clone, Serialize)]
pub struct Change {
    pub address: String,
    #[serde(flatten)]
    pub action: PlanAction,
}

/// Outcome of applying a manifest
#[derive(Debug, Default, Serialize)]
pub struct ApplySummary {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub destroyed: usize,
    pub errors: Vec<String>,
}

impl ApplySummary {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing manifest {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Unique addresses, known types and valid configuration; no API calls
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut problems = Vec::new();
        for entry in &self.resources {
            if !seen.insert(&entry.address) {
                problems.push(format!("{}: duplicate address", entry.address));
                continue;
            }
            let resource = match registry::new_resource(&entry.address.type_name) {
                Ok(resource) => resource,
                Err(err) => {
                    problems.push(format!("{}: {err}", entry.address));
                    continue;
                }
            };
            if let Err(diags) = resource.decode_config(&entry.config) {
                problems.push(format!("{}: {diags}", entry.address));
            }
        }
        if !problems.is_empty() {
            bail!("invalid manifest:\n  {}", problems.join("\n  "));
        }
        Ok(())
    }

    /// The context with this manifest's default tags applied
    pub fn context(&self, ctx: &ResourceContext) -> ResourceContext {
        match &self.default_tags {
            Some(tags) => ctx.clone().with_default_tags(tags.clone()),
            None => ctx.clone(),
        }
    }

    fn contains(&self, address: &Address) -> bool {
        self.resources.iter().any(|r| &r.address == address)
    }

    /// Addresses in state that the manifest no longer lists
    pub fn orphans(&self, state: &StateFile) -> Vec<Address> {
        state
            .addresses()
            .into_iter()
            .filter(|a| !self.contains(a))
            .collect()
    }

    /// Refresh state, then compare it with the manifest
    pub async fn plan(&self, ctx: &ResourceContext, state: &mut StateFile) -> Result<Vec<Change>> {
        let ctx = self.context(ctx);
        refresh(&ctx, state).await?;

        let mut changes = Vec::new();
        for entry in &self.resources {
            let resource = registry::new_resource(&entry.address.type_name)?;
            let config = resource
                .decode_config(&entry.config)
                .with_context(|| format!("{}: invalid configuration", entry.address))?;
            let action = lifecycle::plan(resource.as_ref(), &ctx, state.attributes(&entry.address), &config);
            changes.push(Change {
                address: entry.address.to_string(),
                action,
            });
        }
        for address in self.orphans(state) {
            changes.push(Change {
                address: address.to_string(),
                action: PlanAction::Delete,
            });
        }
        Ok(changes)
    }

    /// Converge every resource; state is updated after each success.
    ///
    /// A failing resource is reported and keeps its previous state, or is
    /// stored tainted when create left a remote object behind; the remaining
    /// resources are still applied.
    pub async fn apply(&self, ctx: &ResourceContext, state: &mut StateFile) -> Result<ApplySummary> {
        let changes = self.plan(ctx, state).await?;
        let ctx = self.context(ctx);
        let mut summary = ApplySummary::default();

        for address in self.orphans(state).into_iter().rev() {
            match destroy_address(&ctx, state, &address).await {
                Ok(()) => summary.destroyed += 1,
                Err(err) => summary.errors.push(format!("{address}: {err:#}")),
            }
        }

        for (entry, change) in self.resources.iter().zip(&changes) {
            if change.action.is_noop() {
                continue;
            }
            let resource = registry::new_resource(&entry.address.type_name)?;
            let prior = state.attributes(&entry.address).cloned();
            match lifecycle::apply(resource.as_ref(), &ctx, prior.as_ref(), &entry.config).await {
                Ok(new_state) => {
                    let id = resource.state_id(&new_state)?;
                    state.set(entry.address.clone(), id, new_state);
                    match change.action {
                        PlanAction::Create => summary.created += 1,
                        PlanAction::Replace { .. } => summary.replaced += 1,
                        _ => summary.updated += 1,
                    }
                }
                Err(err) => {
                    tracing::error!("{}: {:#}", entry.address, err);
                    if let Some(tainted) = lifecycle::tainted_state(&err) {
                        let id = resource.state_id(tainted)?;
                        state.set(entry.address.clone(), id, tainted.clone());
                    }
                    summary.errors.push(format!("{}: {err:#}", entry.address));
                }
            }
        }
        Ok(summary)
    }

    /// Destroy everything in state, last listed first
    pub async fn destroy(&self, ctx: &ResourceContext, state: &mut StateFile) -> Result<ApplySummary> {
        let ctx = self.context(ctx);
        let mut order: Vec<Address> = self.resources.iter().map(|r| r.address.clone()).collect();
        order.extend(self.orphans(state));

        let mut summary = ApplySummary::default();
        for address in order.iter().rev() {
            if state.get(address).is_none() {
                continue;
            }
            match destroy_address(&ctx, state, address).await {
                Ok(()) => summary.destroyed += 1,
                Err(err) => summary.errors.push(format!("{address}: {err:#}")),
            }
        }
        Ok(summary)
    }
}

async fn destroy_address(ctx: &ResourceContext, state: &mut StateFile, address: &Address) -> Result<()> {
    let Some(entry) = state.get(address) else {
        return Ok(());
    };
    let resource = registry::new_resource(&address.type_name)?;
    lifecycle::destroy(resource.as_ref(), ctx, &entry.attributes).await?;
    state.remove(address);
    Ok(())
}

/// Re-read every resource in state, dropping the ones that are gone
pub async fn refresh(ctx: &ResourceContext, state: &mut StateFile) -> Result<()> {
    for address in state.addresses() {
        let Some(entry) = state.get(&address) else {
            continue;
        };
        let resource = registry::new_resource(&address.type_name)?;
        match lifecycle::refresh(resource.as_ref(), ctx, &entry.attributes).await? {
            Some(fresh) => {
                let id = resource.state_id(&fresh)?;
                state.set(address, id, fresh);
            }
            None => {
                state.remove(&address);
            }
        }
    }
    Ok(())
}

/// Adopt an existing resource under `address`
pub async fn import(ctx: &ResourceContext, state: &mut StateFile, address: &Address, id: &str) -> Result<Value> {
    if state.get(address).is_some() {
        bail!("{address} is already managed; remove it from state before importing");
    }
    let resource = registry::new_resource(&address.type_name)?;
    let imported = lifecycle::import(resource.as_ref(), ctx, id).await?;
    let state_id = resource.state_id(&imported)?;
    state.set(address.clone(), state_id, imported.clone());
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
default_tags:
  team: infra
resources:
  - address: aws_appconfig_extension.main
    config:
      name: tf-acc-test-1
      action_point:
        - point: ON_DEPLOYMENT_COMPLETE
          action:
            - name: test
              role_arn: arn:aws:iam::123456789012:role/r
              uri: arn:aws:sns:us-west-2:123456789012:t
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        assert_eq!(manifest.resources.len(), 1);
        assert_eq!(manifest.resources[0].address.name, "main");
        assert_eq!(manifest.default_tags.unwrap()["team"], "infra");
    }

    #[test]
    fn test_rejects_unknown_type_and_duplicates() {
        let err = Manifest::parse(
            r#"
resources:
  - address: aws_nope.a
  - address: aws_appconfig_extension.x
    config: {name: a}
  - address: aws_appconfig_extension.x
    config: {name: a}
"#,
        )
        .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("aws_nope.a"), "{message}");
        assert!(message.contains("duplicate address"), "{message}");
        assert!(message.contains("action_point"), "{message}");
    }

    #[test]
    fn test_orphans() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let mut state = StateFile::default();
        state.set("aws_appconfig_extension.main".parse().unwrap(), "a".to_string(), Value::Null);
        state.set("aws_m2_environment.old".parse().unwrap(), "e".to_string(), Value::Null);
        let orphans = manifest.orphans(&state);
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].to_string(), "aws_m2_environment.old");
    }
}
