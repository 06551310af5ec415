//! End-to-end creation run for one paper.
//!
//! Loads the paper, optionally interprets it, runs the generation loop and
//! persists the run records (`conversation.json`, `trace.json`, chat log).

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Local;
use serde_json::{Map, json};
use tracing::{info, instrument, warn};

use crate::agents::AgentSet;
use crate::agents::interpreter::interpret;
use crate::agents::session::Session;
use crate::core::types::SpanKind;
use crate::io::artifact::ArtifactStore;
use crate::io::config::CreatorConfig;
use crate::io::data::{create_run_dir, load_paper};
use crate::io::human::HumanInput;
use crate::io::llm::ChatBackend;
use crate::io::prompt::PromptEngine;
use crate::io::round_log::write_json;
use crate::io::run_log::RunLog;
use crate::io::sandbox::Sandbox;
use crate::io::trace::field;
use crate::looping::{LoopContext, LoopOutcome, run_loop};

pub const CONVERSATION_FILE: &str = "conversation.json";
pub const TRACE_FILE: &str = "trace.json";
const ROOT_SPAN: &str = "paper2code";
const CREATOR_SPAN: &str = "Model Creator";

pub struct CreateRequest<'a> {
    pub data_dir: &'a Path,
    pub output_dir: &'a Path,
    pub config: &'a CreatorConfig,
    /// Echo conversation turns to stdout.
    pub echo: bool,
}

#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub run_dir: PathBuf,
    pub final_path: PathBuf,
    pub log_path: Option<PathBuf>,
    pub loop_outcome: LoopOutcome,
}

/// Run the full pipeline. Human input is only used with the interpreter.
#[instrument(skip_all, fields(data_dir = %request.data_dir.display()))]
pub fn run_create<B: ChatBackend, S: Sandbox>(
    request: &CreateRequest<'_>,
    backend: &B,
    sandbox: &S,
    human: Option<&dyn HumanInput>,
) -> Result<CreateOutcome> {
    let cfg = request.config;
    cfg.validate()?;
    let paper = load_paper(request.data_dir)?;

    let started_at = Local::now();
    let run_dir = create_run_dir(request.output_dir, &paper.name, started_at)?;
    info!(run_dir = %run_dir.display(), "run started");

    let prompts = PromptEngine::new(&cfg.prompts);
    let agents = AgentSet::new(cfg, &prompts)?;
    let artifacts = ArtifactStore::new(&run_dir, &cfg.artifact_name)?;
    let run_log = RunLog::create(&run_dir, started_at, request.echo)?;
    let log_path = run_log.path().map(Path::to_path_buf);
    let mut session = Session::new(&run_dir, run_log);

    let root = session.tracer.start(ROOT_SPAN, SpanKind::Agent, None);
    session.tracer.set_metadata(root, "data_dir", paper.data_dir.display().to_string());
    session.tracer.set_metadata(root, "max_iter", cfg.max_iter);
    session.parent_span = Some(root);

    let result = drive(
        &mut session,
        cfg,
        &agents,
        &prompts,
        &artifacts,
        &paper.description,
        backend,
        sandbox,
        human,
        &run_dir,
    );

    let outputs = match &result {
        Ok(outcome) => field("final_path", outcome.final_path.display().to_string()),
        Err(err) => field("error", format!("{err:#}")),
    };
    session
        .tracer
        .finish(root, field("script", paper.description.as_str()), outputs);
    persist_records(&mut session, &run_dir);

    let loop_outcome = result?;
    info!(
        final_path = %loop_outcome.final_path.display(),
        approved = loop_outcome.stop.approved(),
        "run finished"
    );
    Ok(CreateOutcome {
        final_path: loop_outcome.final_path.clone(),
        run_dir,
        log_path,
        loop_outcome,
    })
}

#[allow(clippy::too_many_arguments)]
fn drive<B: ChatBackend, S: Sandbox>(
    session: &mut Session,
    cfg: &CreatorConfig,
    agents: &AgentSet,
    prompts: &PromptEngine,
    artifacts: &ArtifactStore,
    description: &str,
    backend: &B,
    sandbox: &S,
    human: Option<&dyn HumanInput>,
    run_dir: &Path,
) -> Result<LoopOutcome> {
    let root = session.parent_span;

    let brief = if cfg.use_interpreter {
        let span = session.start_span(agents.interpreter.role.display_name(), SpanKind::Chain);
        session.parent_span = Some(span);
        let human = if cfg.human_input_mode { human } else { None };
        let interpreted = interpret(session, backend, &agents.interpreter, description, human);
        session.parent_span = root;
        let interpretation = match interpreted {
            Ok(text) => text,
            Err(err) => {
                session.tracer.finish(span, Map::new(), Map::new());
                return Err(err.context("interpret paper"));
            }
        };
        session
            .tracer
            .finish(span, Map::new(), field("interpretation", interpretation.as_str()));
        interpretation
    } else {
        description.to_string()
    };

    let span = session.start_span(CREATOR_SPAN, SpanKind::Chain);
    session.parent_span = Some(span);
    let ctx = LoopContext {
        agents,
        prompts,
        backend,
        sandbox,
        artifacts,
        commander: cfg.commander.clone(),
        max_iter: cfg.max_iter,
        sentinel: &cfg.sentinel,
        review_input: description,
        records_dir: Some(run_dir),
    };
    let outcome = run_loop(&ctx, session, &brief, |round| {
        info!(round = round.round, verdict = ?round.verdict, "critique round recorded");
    });
    session.parent_span = root;

    let outputs = match &outcome {
        Ok(o) => {
            let mut out = field("final_path", o.final_path.display().to_string());
            out.insert("stop".to_string(), json!(o.stop));
            out
        }
        Err(err) => field("error", format!("{err:#}")),
    };
    session
        .tracer
        .finish(span, field("description", brief.as_str()), outputs);
    outcome
}

/// Best-effort write of the conversation and trace, then close the run log.
fn persist_records(session: &mut Session, run_dir: &Path) {
    let conversation_path = run_dir.join(CONVERSATION_FILE);
    if let Err(err) = write_json(&conversation_path, &session.conversation) {
        warn!(err = %err, path = %conversation_path.display(), "failed to write conversation");
    }
    session.tracer.write(&run_dir.join(TRACE_FILE));
    session.run_log.close();
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::types::{LoopStop, Role};
    use crate::test_support::{FileOnlySandbox, ScriptedBackend, ScriptedHuman, TestPaper, script_coder};

    #[test]
    fn run_writes_records_next_to_artifacts() {
        let paper = TestPaper::new("lenet", "LeNet-5.\n<img figure.png>").expect("paper");
        let cfg = CreatorConfig {
            max_iter: 1,
            ..CreatorConfig::default()
        };
        let backend = ScriptedBackend::new();
        script_coder(&backend, "class LeNet: pass");
        backend.push(Role::Critics, "NO_ISSUES");

        let outcome = run_create(
            &CreateRequest {
                data_dir: &paper.data_dir,
                output_dir: &paper.output_dir,
                config: &cfg,
                echo: false,
            },
            &backend,
            &FileOnlySandbox,
            None,
        )
        .expect("run");

        assert!(outcome.run_dir.starts_with(paper.output_dir.join("lenet")));
        assert_eq!(outcome.final_path, outcome.run_dir.join("model_1.py"));
        assert_eq!(outcome.loop_outcome.stop, LoopStop::Approved { round: 1 });
        assert!(outcome.run_dir.join(CONVERSATION_FILE).is_file());
        assert!(outcome.log_path.as_deref().is_some_and(Path::is_file));

        let trace: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(outcome.run_dir.join(TRACE_FILE)).expect("trace"),
        )
        .expect("json");
        assert_eq!(trace[0]["name"], ROOT_SPAN);
        assert_eq!(trace[0]["children"][0]["name"], CREATOR_SPAN);

        let critics_request = backend
            .requests()
            .into_iter()
            .find(|r| r.agent == Role::Critics)
            .expect("critics request");
        let wire = serde_json::to_string(&critics_request).expect("serialize");
        assert!(wire.contains("data:image/png;base64,"));
    }

    #[test]
    fn interpreter_output_seeds_the_coder() {
        let paper = TestPaper::new("vit", "A vision transformer.").expect("paper");
        let cfg = CreatorConfig {
            max_iter: 0,
            use_interpreter: true,
            human_input_mode: true,
            ..CreatorConfig::default()
        };
        let backend = ScriptedBackend::new();
        backend.push(Role::Interpreter, "12 layers, patch size 16");
        script_coder(&backend, "class ViT: pass");
        let human = ScriptedHuman::new([""]);

        let outcome = run_create(
            &CreateRequest {
                data_dir: &paper.data_dir,
                output_dir: &paper.output_dir,
                config: &cfg,
                echo: false,
            },
            &backend,
            &FileOnlySandbox,
            Some(&human),
        )
        .expect("run");

        assert_eq!(outcome.final_path, outcome.run_dir.join("model.py"));
        assert_eq!(human.asked(), 1);
        let first_coder = backend
            .requests()
            .into_iter()
            .find(|r| r.agent == Role::Coder)
            .expect("coder request");
        let wire = serde_json::to_string(&first_coder).expect("serialize");
        assert!(wire.contains("12 layers, patch size 16"));
    }

    #[test]
    fn back_to_back_runs_get_separate_dirs() {
        let paper = TestPaper::new("cnn", "A small CNN.").expect("paper");
        let cfg = CreatorConfig {
            max_iter: 1,
            ..CreatorConfig::default()
        };
        let run = |code: &str| {
            let backend = ScriptedBackend::new();
            script_coder(&backend, code);
            backend.push(Role::Critics, "NO_ISSUES");
            run_create(
                &CreateRequest {
                    data_dir: &paper.data_dir,
                    output_dir: &paper.output_dir,
                    config: &cfg,
                    echo: false,
                },
                &backend,
                &FileOnlySandbox,
                None,
            )
        };

        let first = run("first").expect("first run");
        let second = run("second").expect("second run");

        assert_ne!(first.run_dir, second.run_dir);
        assert_ne!(first.log_path, second.log_path);
        let first_live = fs::read_to_string(first.run_dir.join("model.py")).expect("first live");
        assert!(first_live.ends_with("first"), "{first_live}");
        let second_final = fs::read_to_string(&second.final_path).expect("second final");
        assert!(second_final.ends_with("second"), "{second_final}");
    }

    #[test]
    fn failed_run_still_writes_trace() {
        let paper = TestPaper::new("mlp", "An MLP.").expect("paper");
        let cfg = CreatorConfig {
            max_iter: 1,
            ..CreatorConfig::default()
        };
        let backend = ScriptedBackend::new();
        backend.push(Role::Coder, "TERMINATE");

        let err = run_create(
            &CreateRequest {
                data_dir: &paper.data_dir,
                output_dir: &paper.output_dir,
                config: &cfg,
                echo: false,
            },
            &backend,
            &FileOnlySandbox,
            None,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("read artifact"));

        let run_dirs: Vec<_> = fs::read_dir(paper.output_dir.join("mlp"))
            .expect("read output")
            .collect();
        assert_eq!(run_dirs.len(), 1);
        let run_dir = run_dirs[0].as_ref().expect("entry").path();
        assert!(run_dir.join(TRACE_FILE).is_file());
        assert!(run_dir.join(CONVERSATION_FILE).is_file());
    }
}
