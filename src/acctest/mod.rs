//! Acceptance test harness
//!
//! A [`TestCase`] drives one resource type through a sequence of [`TestStep`]s
//! using the same lifecycle path as the CLI:
//!
//! - config steps apply a YAML fixture, run checks against the flattened state,
//!   then plan again and require no changes
//! - import steps adopt the resource by ID and compare the imported state with
//!   the applied one
//! - a step marked [`TestStep::disappears`] deletes the resource out-of-band and
//!   requires the next refresh to notice
//!
//! After the last step the resource is destroyed and a read must report it gone.
//!
//! Steps run against whatever [`ResourceContext`] the test passes in: a
//! [`FakeCloud`] context for offline runs, or a live context built from
//! [`ProviderConfig`](crate::config::ProviderConfig).

pub mod fake;

pub use fake::FakeCloud;

use crate::provider::ResourceContext;
use crate::resource::{lifecycle, registry, DynResource};
use crate::schema::flatmap::{self, FlatMap};
use crate::sweep;
use anyhow::{anyhow, bail, ensure, Context, Result};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Name prefix for everything acceptance tests create; sweepers match it
pub const RESOURCE_PREFIX: &str = sweep::DEFAULT_PREFIX;

/// A unique name starting with [`RESOURCE_PREFIX`]
pub fn random_name() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{RESOURCE_PREFIX}-{}", &suffix[..10])
}

/// What a check sees after a step
pub struct CheckInput<'a> {
    pub state: &'a Value,
    pub flat: FlatMap,
    pub region: &'a str,
}

pub type Check = Box<dyn Fn(&CheckInput<'_>) -> Result<()> + Send + Sync>;

/// Count keys (`x.#`, `x.%`) read as zero when absent
fn lookup<'a>(flat: &'a FlatMap, key: &str) -> Option<&'a str> {
    match flat.get(key) {
        Some(v) => Some(v.as_str()),
        None if key.ends_with(".#") || key.ends_with(".%") => Some("0"),
        None => None,
    }
}

/// `key` equals `value`
pub fn attr(key: &str, value: impl Into<String>) -> Check {
    let key = key.to_string();
    let value = value.into();
    Box::new(move |input| match lookup(&input.flat, &key) {
        Some(actual) if actual == value => Ok(()),
        Some(actual) => bail!("{key}: expected {value:?}, got {actual:?}"),
        None => bail!("{key}: expected {value:?}, attribute not set"),
    })
}

/// `key` is present and non-empty
pub fn attr_set(key: &str) -> Check {
    let key = key.to_string();
    Box::new(move |input| match input.flat.get(&key) {
        Some(v) if !v.is_empty() => Ok(()),
        _ => bail!("{key}: expected a value"),
    })
}

/// `key` is absent (zero for counts)
pub fn no_attr(key: &str) -> Check {
    let key = key.to_string();
    Box::new(move |input| match input.flat.get(&key) {
        None => Ok(()),
        Some(v) if v == "0" && (key.ends_with(".#") || key.ends_with(".%")) => Ok(()),
        Some(v) => bail!("{key}: expected no value, got {v:?}"),
    })
}

/// Some element selected by `path` (with `*` wildcards) contains every pair
/// in `expected`, addressed relative to the element
pub fn set_elem_nested_attrs(path: &str, expected: &[(&str, &str)]) -> Check {
    let path = path.to_string();
    let expected: Vec<(String, String)> = expected
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Box::new(move |input| {
        let elements = flatmap::select(input.state, &path);
        let found = elements.iter().any(|element| {
            let flat = flatmap::flatten_block(element);
            expected
                .iter()
                .all(|(k, v)| lookup(&flat, k) == Some(v.as_str()))
        });
        ensure!(
            found,
            "{path}: no element among {} matches {:?}",
            elements.len(),
            expected
        );
        Ok(())
    })
}

/// `key` is an ARN in the test region whose resource part starts with
/// `resource_prefix`
pub fn regional_arn(key: &str, service: &str, resource_prefix: &str) -> Check {
    let key = key.to_string();
    let service = service.to_string();
    let resource_prefix = resource_prefix.to_string();
    Box::new(move |input| {
        let value = input
            .flat
            .get(&key)
            .ok_or_else(|| anyhow!("{key}: expected an ARN, attribute not set"))?;
        let parts: Vec<&str> = value.splitn(6, ':').collect();
        let valid = parts.len() == 6
            && parts[0] == "arn"
            && parts[1].starts_with("aws")
            && parts[2] == service
            && parts[3] == input.region
            && parts[4].len() == 12
            && parts[4].chars().all(|c| c.is_ascii_digit())
            && parts[5].starts_with(&resource_prefix);
        ensure!(
            valid,
            "{key}: {value:?} is not a {service} ARN in {} for {resource_prefix}",
            input.region
        );
        Ok(())
    })
}

/// An attribute value remembered across steps
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Option<String>>>);

impl Captured {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set(&self, value: Option<String>) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = value;
    }

    /// Remember the current value of `key`
    pub fn capture(&self, key: &str) -> Check {
        let slot = self.clone();
        let key = key.to_string();
        Box::new(move |input| {
            let value = input
                .flat
                .get(&key)
                .ok_or_else(|| anyhow!("{key}: nothing to capture"))?;
            slot.set(Some(value.clone()));
            Ok(())
        })
    }

    /// `key` still has the captured value
    pub fn unchanged(&self, key: &str) -> Check {
        self.compare(key, true)
    }

    /// `key` differs from the captured value
    pub fn changed(&self, key: &str) -> Check {
        self.compare(key, false)
    }

    fn compare(&self, key: &str, same: bool) -> Check {
        let slot = self.clone();
        let key = key.to_string();
        Box::new(move |input| {
            let before = slot
                .get()
                .ok_or_else(|| anyhow!("{key}: no captured value"))?;
            let now = input.flat.get(&key).cloned().unwrap_or_default();
            ensure!(
                (now == before) == same,
                "{key}: expected {} {before:?}, got {now:?}",
                if same { "unchanged" } else { "a change from" }
            );
            Ok(())
        })
    }
}

enum StepKind {
    Config(Value),
    Import { ignore: Vec<String> },
}

/// One step of a [`TestCase`]
pub struct TestStep {
    kind: StepKind,
    checks: Vec<Check>,
    expect_error: Option<String>,
    expect_non_empty_plan: bool,
    disappears: bool,
}

impl TestStep {
    /// Apply a YAML (or JSON) configuration fixture
    pub fn config(fixture: &str) -> Result<Self> {
        let value: Value =
            serde_yaml::from_str(fixture).context("parsing configuration fixture")?;
        Ok(Self::from_kind(StepKind::Config(value)))
    }

    /// Import the current resource by ID and compare with applied state
    pub fn import() -> Self {
        Self::from_kind(StepKind::Import { ignore: Vec::new() })
    }

    fn from_kind(kind: StepKind) -> Self {
        Self {
            kind,
            checks: Vec::new(),
            expect_error: None,
            expect_non_empty_plan: false,
            disappears: false,
        }
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn checks(mut self, checks: impl IntoIterator<Item = Check>) -> Self {
        self.checks.extend(checks);
        self
    }

    /// Attributes (and everything under them) left out of import verification
    pub fn verify_ignore(mut self, attributes: &[&str]) -> Self {
        if let StepKind::Import { ignore } = &mut self.kind {
            ignore.extend(attributes.iter().map(|a| a.to_string()));
        }
        self
    }

    /// The step must fail with an error containing `message`
    pub fn expect_error(mut self, message: &str) -> Self {
        self.expect_error = Some(message.to_string());
        self
    }

    pub fn expect_non_empty_plan(mut self) -> Self {
        self.expect_non_empty_plan = true;
        self
    }

    /// Delete the resource behind the harness's back after the checks pass
    pub fn disappears(mut self) -> Self {
        self.disappears = true;
        self.expect_non_empty_plan = true;
        self
    }
}

/// Outcome of a run, for assertions beyond the built-in checks
#[derive(Debug, Default)]
pub struct TestReport {
    /// State after each successful config step
    pub states: Vec<Value>,
    pub ids: Vec<String>,
}

/// A sequence of steps against one resource type
pub struct TestCase {
    resource: Box<dyn DynResource>,
    steps: Vec<TestStep>,
}

impl TestCase {
    pub fn new(type_name: &str) -> Result<Self> {
        Ok(Self {
            resource: registry::new_resource(type_name)?,
            steps: Vec::new(),
        })
    }

    pub fn step(mut self, step: TestStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Run every step, then destroy what is left.
    ///
    /// The resource is destroyed even when a step fails; the step error wins.
    pub async fn run(self, ctx: &ResourceContext) -> Result<TestReport> {
        let resource = self.resource.as_ref();
        let mut report = TestReport::default();
        let mut state: Option<Value> = None;
        let total = self.steps.len();

        let mut outcome = Ok(());
        for (i, step) in self.steps.iter().enumerate() {
            let result = run_step(resource, ctx, step, &mut state, &mut report).await;
            if let Err(err) = result {
                outcome = Err(err.context(format!("step {}/{}", i + 1, total)));
                break;
            }
        }

        let destroyed = destroy(resource, ctx, state.as_ref(), &report).await;
        outcome.and(destroyed).map(|_| report)
    }
}

async fn run_step(
    resource: &dyn DynResource,
    ctx: &ResourceContext,
    step: &TestStep,
    state: &mut Option<Value>,
    report: &mut TestReport,
) -> Result<()> {
    match &step.kind {
        StepKind::Config(config) => {
            if let Some(prior) = state.as_ref() {
                *state = lifecycle::refresh(resource, ctx, prior).await?;
            }

            let applied = lifecycle::apply(resource, ctx, state.as_ref(), config).await;
            if let Err(err) = &applied {
                if let Some(tainted) = lifecycle::tainted_state(err) {
                    *state = Some(tainted.clone());
                }
            }
            let new_state = match (applied, &step.expect_error) {
                (Err(err), Some(expected)) => {
                    let message = format!("{err:#}");
                    ensure!(
                        message.contains(expected.as_str()),
                        "expected error containing {expected:?}, got: {message}"
                    );
                    return Ok(());
                }
                (Ok(_), Some(expected)) => bail!("expected error containing {expected:?}, step succeeded"),
                (Err(err), None) => return Err(err),
                (Ok(new_state), None) => new_state,
            };

            let id = resource.state_id(&new_state)?;
            tracing::debug!("Step applied {} ({})", resource.type_name(), id);
            run_checks(ctx, &step.checks, &new_state)?;
            report.ids.push(id.clone());
            report.states.push(new_state.clone());
            *state = Some(new_state);

            if step.disappears {
                let current = state.take().context("no state to delete")?;
                resource
                    .delete(ctx, &current)
                    .await
                    .with_context(|| format!("deleting {} ({id}) out-of-band", resource.type_name()))?;
                let refreshed = lifecycle::refresh(resource, ctx, &current).await?;
                ensure!(
                    refreshed.is_none(),
                    "{} ({id}) still exists after out-of-band delete",
                    resource.type_name()
                );
            }

            check_plan(resource, ctx, state, config, step.expect_non_empty_plan).await
        }
        StepKind::Import { ignore } => {
            let current = state.as_ref().context("import step needs a prior config step")?;
            let id = resource.state_id(current)?;
            let imported = lifecycle::import(resource, ctx, &id).await?;
            run_checks(ctx, &step.checks, &imported)?;
            verify_import(current, &imported, ignore)
        }
    }
}

fn run_checks(ctx: &ResourceContext, checks: &[Check], state: &Value) -> Result<()> {
    let input = CheckInput {
        state,
        flat: flatmap::flatten(state),
        region: &ctx.region,
    };
    checks.iter().try_for_each(|check| check(&input))
}

/// Refresh and plan again; the plan must be empty unless the step expects otherwise
async fn check_plan(
    resource: &dyn DynResource,
    ctx: &ResourceContext,
    state: &mut Option<Value>,
    config: &Value,
    expect_non_empty: bool,
) -> Result<()> {
    if let Some(prior) = state.as_ref() {
        *state = lifecycle::refresh(resource, ctx, prior).await?;
    }
    let decoded = resource
        .decode_config(config)
        .context("re-decoding configuration")?;
    let action = lifecycle::plan(resource, ctx, state.as_ref(), &decoded);
    match (action.is_noop(), expect_non_empty) {
        (true, true) => bail!("expected a non-empty plan after apply, got no changes"),
        (false, false) => bail!("plan after apply is not empty: {action}"),
        _ => Ok(()),
    }
}

fn ignored(key: &str, ignore: &[String]) -> bool {
    ignore
        .iter()
        .any(|prefix| key == prefix || key.starts_with(&format!("{prefix}.")))
}

fn verify_import(applied: &Value, imported: &Value, ignore: &[String]) -> Result<()> {
    let want = flatmap::flatten(applied);
    let got = flatmap::flatten(imported);
    let mut diffs = Vec::new();
    for key in want.keys().chain(got.keys()) {
        if ignored(key, ignore) || diffs.iter().any(|(k, _, _)| k == key) {
            continue;
        }
        let (a, b) = (want.get(key), got.get(key));
        if a != b {
            diffs.push((key.clone(), a.cloned(), b.cloned()));
        }
    }
    if diffs.is_empty() {
        return Ok(());
    }
    let lines: Vec<String> = diffs
        .into_iter()
        .map(|(k, a, b)| format!("  {k}: applied {a:?}, imported {b:?}"))
        .collect();
    bail!("imported state differs from applied state:\n{}", lines.join("\n"))
}

async fn destroy(
    resource: &dyn DynResource,
    ctx: &ResourceContext,
    state: Option<&Value>,
    report: &TestReport,
) -> Result<()> {
    if let Some(state) = state {
        lifecycle::destroy(resource, ctx, state).await?;
    }
    for id in &report.ids {
        let found = resource
            .read(ctx, id)
            .await
            .with_context(|| format!("checking {} ({id}) is destroyed", resource.type_name()))?;
        ensure!(
            found.is_none(),
            "{} ({id}) still exists after destroy",
            resource.type_name()
        );
    }
    Ok(())
}
