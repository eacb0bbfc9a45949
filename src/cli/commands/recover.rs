//! recover command - Carry triage from mistakenly closed issues to their siblings

use std::sync::Arc;

use anyhow::{bail, Context as _, Result};

use super::Context;
use crate::core::config::schema::MAX_CONCURRENCY;
use crate::core::types::TriageAttribute;
use crate::engine::{self, CancelFlag, RecoverySet, RunOptions, Scope};
use crate::tracker::sonarqube::SonarQubeTracker;
use crate::tracker::IssueTracker;
use crate::ui::output;

/// Arguments of `trec recover`.
#[derive(Debug, Clone, Default)]
pub struct RecoverArgs {
    pub components: Vec<String>,
    pub apply: bool,
    pub attributes: Vec<String>,
    pub json: bool,
    pub concurrency: Option<usize>,
}

/// Run the recover command.
///
/// Exits non-zero when any issue failed, after printing the full report.
pub fn recover(ctx: &Context, args: RecoverArgs) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(recover_async(ctx, args))
}

/// Resolve flags over config into run settings.
pub(crate) fn resolve(ctx: &Context, args: &RecoverArgs) -> Result<(Scope, RunOptions)> {
    let recover: RecoverySet = if args.attributes.is_empty() {
        ctx.config.attributes()?.into_iter().collect()
    } else {
        args.attributes
            .iter()
            .map(|name| name.parse::<TriageAttribute>())
            .collect::<Result<_, _>>()?
    };

    let concurrency = args.concurrency.unwrap_or_else(|| ctx.config.concurrency());
    if concurrency == 0 || concurrency > MAX_CONCURRENCY {
        bail!(
            "concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY,
            concurrency
        );
    }

    let components = if args.components.is_empty() {
        ctx.config.components().to_vec()
    } else {
        args.components.clone()
    };

    let scope = Scope {
        components,
        page_size: ctx.config.page_size(),
    };
    let options = RunOptions {
        dry_run: !args.apply && ctx.config.dry_run(),
        recover,
        concurrency,
        retry: ctx.config.retry_policy(),
        cancel: CancelFlag::new(),
    };
    Ok((scope, options))
}

async fn recover_async(ctx: &Context, args: RecoverArgs) -> Result<()> {
    let (scope, options) = resolve(ctx, &args)?;

    let url = ctx.url();
    let token = ctx.token();
    if token.is_none() {
        tracing::warn!("no token configured; using anonymous access");
    }
    let tracker: Arc<dyn IssueTracker> = Arc::new(
        SonarQubeTracker::new(&url, token)
            .with_context(|| format!("Failed to create client for {}", url))?,
    );

    if scope.components.is_empty() {
        tracing::info!("searching all issues on {}", url);
    } else {
        tracing::info!("searching {} on {}", scope.components.join(", "), url);
    }
    if options.dry_run {
        tracing::info!("dry run, recovering {}", options.recover);
    } else {
        tracing::info!("applying, recovering {}", options.recover);
    }

    let cancel = options.cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; finishing in-flight requests");
            cancel.cancel();
        }
    });

    let result = engine::recover(tracker, &scope, &options).await;
    interrupt.abort();
    let report = result?;

    if args.json {
        println!("{}", output::render_report_json(&report)?);
    } else {
        output::print(output::render_report(&report).trim_end(), ctx.verbosity);
    }

    let summary = report.summary();
    if summary.failed > 0 {
        bail!("{} issue(s) failed; see the report above", summary.failed);
    }
    if summary.cancelled > 0 {
        bail!("run interrupted; {} issue(s) not processed", summary.cancelled);
    }
    Ok(())
}
