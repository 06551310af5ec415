//! Bootstrap generation followed by bounded critique/revise rounds.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, instrument};

use crate::agents::AgentSet;
use crate::agents::commander::CodingExchange;
use crate::agents::critics::review;
use crate::agents::session::Session;
use crate::core::types::{LoopStop, Phase, Verdict};
use crate::io::artifact::ArtifactStore;
use crate::io::config::CommanderConfig;
use crate::io::llm::ChatBackend;
use crate::io::prompt::PromptEngine;
use crate::io::round_log::{RoundMeta, write_round};
use crate::io::sandbox::Sandbox;

/// Everything the loop needs besides the session.
pub struct LoopContext<'a, B: ChatBackend, S: Sandbox> {
    pub agents: &'a AgentSet,
    pub prompts: &'a PromptEngine,
    pub backend: &'a B,
    pub sandbox: &'a S,
    pub artifacts: &'a ArtifactStore,
    pub commander: CommanderConfig,
    pub max_iter: u32,
    pub sentinel: &'a str,
    /// Description the critics compare the code against.
    pub review_input: &'a str,
    /// Directory for `rounds/<n>/` records; `None` skips them.
    pub records_dir: Option<&'a Path>,
}

/// Result of one critique round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    pub round: u32,
    pub verdict: Verdict,
    pub snapshot: PathBuf,
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub rounds_executed: u32,
    /// Coder revisions requested after a critique.
    pub revisions: u32,
    pub stop: LoopStop,
    /// Last round's snapshot, or the live artifact when no round ran.
    pub final_path: PathBuf,
    pub snapshots: Vec<PathBuf>,
}

/// Generate the artifact from `brief`, then run up to `max_iter` rounds.
///
/// A round reads the live artifact, asks the critics for a review and stops
/// on approval; otherwise the feedback goes back to the coder. Every executed
/// round ends with a snapshot. A missing artifact is fatal.
#[instrument(skip_all, fields(max_iter = ctx.max_iter))]
pub fn run_loop<B: ChatBackend, S: Sandbox, F: FnMut(&RoundOutcome)>(
    ctx: &LoopContext<'_, B, S>,
    session: &mut Session,
    brief: &str,
    mut on_round: F,
) -> Result<LoopOutcome> {
    let exchange = CodingExchange::new(
        &ctx.agents.commander,
        &ctx.agents.coder,
        ctx.sandbox,
        ctx.commander.clone(),
    );

    session.phase = Phase::Bootstrap;
    let create = ctx.prompts.create_request(brief)?;
    exchange
        .delegate(session, ctx.backend, &create)
        .context("bootstrap generation")?;

    let mut snapshots = Vec::new();
    let mut revisions = 0u32;
    let mut stop = LoopStop::Exhausted {
        rounds: ctx.max_iter,
    };

    for round in 1..=ctx.max_iter {
        session.phase = Phase::Round(round);
        let started_at = Utc::now();
        let started = Instant::now();

        let code = ctx
            .artifacts
            .read_current()
            .with_context(|| format!("round {round}"))?;
        let request = ctx.prompts.review_request(ctx.review_input, &code)?;
        let critique = review(
            session,
            ctx.backend,
            &ctx.agents.critics,
            &request,
            ctx.sentinel,
        )?;

        if critique.verdict == Verdict::Feedback {
            let revision = ctx.prompts.revision_request(&code, &critique.reply)?;
            exchange
                .delegate(session, ctx.backend, &revision)
                .with_context(|| format!("round {round} revision"))?;
            revisions += 1;
        }

        let snapshot = ctx.artifacts.snapshot(round)?;
        if let Some(dir) = ctx.records_dir {
            let meta = RoundMeta {
                round,
                verdict: critique.verdict,
                snapshot: snapshot.clone(),
                started_at: Some(started_at.to_rfc3339()),
                ended_at: Some(Utc::now().to_rfc3339()),
                duration_ms: Some(started.elapsed().as_millis() as u64),
            };
            write_round(dir, &meta, &critique.reply)?;
        }
        info!(round, verdict = ?critique.verdict, snapshot = %snapshot.display(), "round finished");

        let outcome = RoundOutcome {
            round,
            verdict: critique.verdict,
            snapshot: snapshot.clone(),
        };
        snapshots.push(snapshot);
        on_round(&outcome);

        if critique.verdict == Verdict::Approved {
            stop = LoopStop::Approved { round };
            break;
        }
    }

    let final_path = snapshots
        .last()
        .cloned()
        .unwrap_or_else(|| ctx.artifacts.live_path().to_path_buf());
    Ok(LoopOutcome {
        rounds_executed: snapshots.len() as u32,
        revisions,
        stop,
        final_path,
        snapshots,
    })
}
