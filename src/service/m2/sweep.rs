use super::{application, deployment, environment};
use crate::provider::ResourceContext;
use crate::sweep::{SweepResource, Sweeper};
use anyhow::{Context, Result};
use futures::future::BoxFuture;

pub static SWEEPERS: &[Sweeper] = &[
    Sweeper {
        name: application::TYPE_NAME,
        dependencies: &[deployment::TYPE_NAME],
        list: list_applications,
    },
    Sweeper {
        name: deployment::TYPE_NAME,
        dependencies: &[],
        list: list_deployments,
    },
    Sweeper {
        name: environment::TYPE_NAME,
        dependencies: &[deployment::TYPE_NAME],
        list: list_environments,
    },
];

fn list_applications(ctx: &ResourceContext) -> BoxFuture<'_, Result<Vec<SweepResource>>> {
    Box::pin(async move {
        let mut found = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = ctx
                .m2
                .list_applications(next_token.as_deref())
                .await
                .context("listing M2 Applications")?;
            found.extend(
                page.items
                    .into_iter()
                    .map(|a| SweepResource::new(application::TYPE_NAME, a.application_id, a.name)),
            );
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }
        Ok(found)
    })
}

/// Deployments have no name of their own; they match by application name
fn list_deployments(ctx: &ResourceContext) -> BoxFuture<'_, Result<Vec<SweepResource>>> {
    Box::pin(async move {
        let applications = list_applications(ctx).await?;
        let mut found = Vec::new();
        for app in applications {
            let mut next_token: Option<String> = None;
            loop {
                let page = ctx
                    .m2
                    .list_deployments(&app.id, next_token.as_deref())
                    .await
                    .with_context(|| format!("listing M2 Deployments for {}", app.id))?;
                found.extend(page.items.into_iter().map(|d| {
                    SweepResource::new(
                        deployment::TYPE_NAME,
                        deployment::deployment_id(&d.application_id, &d.deployment_id),
                        app.name.clone(),
                    )
                }));
                match page.next_token {
                    Some(token) => next_token = Some(token),
                    None => break,
                }
            }
        }
        Ok(found)
    })
}

fn list_environments(ctx: &ResourceContext) -> BoxFuture<'_, Result<Vec<SweepResource>>> {
    Box::pin(async move {
        let mut found = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = ctx
                .m2
                .list_environments(next_token.as_deref())
                .await
                .context("listing M2 Environments")?;
            found.extend(
                page.items
                    .into_iter()
                    .map(|e| SweepResource::new(environment::TYPE_NAME, e.environment_id, e.name)),
            );
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }
        Ok(found)
    })
}
