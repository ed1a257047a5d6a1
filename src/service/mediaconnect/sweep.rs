use super::flow;
use crate::provider::ResourceContext;
use crate::sweep::{SweepResource, Sweeper};
use anyhow::{Context, Result};
use futures::future::BoxFuture;

pub static SWEEPERS: &[Sweeper] = &[Sweeper {
    name: flow::TYPE_NAME,
    dependencies: &[],
    list: list_flows,
}];

fn list_flows(ctx: &ResourceContext) -> BoxFuture<'_, Result<Vec<SweepResource>>> {
    Box::pin(async move {
        let mut found = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = ctx
                .mediaconnect
                .list_flows(next_token.as_deref())
                .await
                .context("listing MediaConnect Flows")?;
            found.extend(
                page.flows
                    .into_iter()
                    .map(|f| SweepResource::new(flow::TYPE_NAME, f.flow_arn, f.name)),
            );
            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }
        Ok(found)
    })
}
