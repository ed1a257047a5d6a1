use super::extension;
use crate::provider::ResourceContext;
use crate::sweep::{SweepResource, Sweeper};
use anyhow::{Context, Result};
use futures::future::BoxFuture;

pub static SWEEPERS: &[Sweeper] = &[Sweeper {
    name: extension::TYPE_NAME,
    dependencies: &[],
    list: list_extensions,
}];

fn list_extensions(ctx: &ResourceContext) -> BoxFuture<'_, Result<Vec<SweepResource>>> {
    Box::pin(async move {
        let mut found = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = ctx
                .appconfig
                .list_extensions(next_token.as_deref())
                .await
                .context("listing AppConfig Extensions")?;
            found.extend(
                page.items
                    .into_iter()
                    .map(|e| SweepResource::new(extension::TYPE_NAME, e.id, e.name)),
            );
            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }
        Ok(found)
    })
}
