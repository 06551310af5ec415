//! System prompts and message templates for the agents.
//!
//! Built-in templates live in `io/prompts/`; each system prompt can be
//! replaced from the config, and overrides are rendered with the same
//! variables (`artifact`, `sentinel`).

use anyhow::{Context, Result};
use minijinja::{Environment, Value, context};

use crate::core::types::Role;
use crate::io::config::PromptOverrides;

const COMMANDER_TEMPLATE: &str = include_str!("prompts/commander.md");
const CODER_TEMPLATE: &str = include_str!("prompts/coder.md");
const CRITICS_TEMPLATE: &str = include_str!("prompts/critics.md");
const INTERPRETER_TEMPLATE: &str = include_str!("prompts/interpreter.md");
const CREATE_REQUEST_TEMPLATE: &str = include_str!("prompts/create_request.md");
const REVIEW_REQUEST_TEMPLATE: &str = include_str!("prompts/review_request.md");
const REVISION_REQUEST_TEMPLATE: &str = include_str!("prompts/revision_request.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
    overrides: PromptOverrides,
}

impl PromptEngine {
    pub fn new(overrides: &PromptOverrides) -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("commander", COMMANDER_TEMPLATE),
            ("coder", CODER_TEMPLATE),
            ("critics", CRITICS_TEMPLATE),
            ("interpreter", INTERPRETER_TEMPLATE),
            ("create_request", CREATE_REQUEST_TEMPLATE),
            ("review_request", REVIEW_REQUEST_TEMPLATE),
            ("revision_request", REVISION_REQUEST_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("built-in prompt template should be valid");
        }
        Self {
            env,
            overrides: overrides.clone(),
        }
    }

    /// System prompt for `role`. The user has none.
    pub fn system_prompt(&self, role: Role, artifact: &str, sentinel: &str) -> Result<String> {
        let ctx = context! { artifact => artifact, sentinel => sentinel };
        let override_source = match role {
            Role::User => return Ok(String::new()),
            Role::Commander => &self.overrides.commander,
            Role::Coder => &self.overrides.coder,
            Role::Critics => &self.overrides.critics,
            Role::Interpreter => &self.overrides.interpreter,
        };
        if override_source.trim().is_empty() {
            self.render(role.as_str(), ctx)
        } else {
            self.env
                .render_str(override_source, ctx)
                .with_context(|| format!("render {role} prompt override"))
        }
    }

    /// First message of the bootstrap exchange.
    pub fn create_request(&self, description: &str) -> Result<String> {
        self.render("create_request", context! { description => description })
    }

    /// Critics request: the original description plus the current code.
    pub fn review_request(&self, description: &str, code: &str) -> Result<String> {
        self.render(
            "review_request",
            context! { description => description, code => code },
        )
    }

    /// Coder request carrying the reviewed code and the critique.
    pub fn revision_request(&self, code: &str, feedback: &str) -> Result<String> {
        self.render(
            "revision_request",
            context! { code => code, feedback => feedback },
        )
    }

    fn render(&self, name: &str, ctx: Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        template
            .render(ctx)
            .with_context(|| format!("render {name} template"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PromptEngine {
        PromptEngine::new(&PromptOverrides::default())
    }

    #[test]
    fn system_prompts_mention_artifact_and_sentinel() {
        let engine = engine();
        let coder = engine
            .system_prompt(Role::Coder, "net.py", "LGTM")
            .expect("coder");
        assert!(coder.contains("`net.py`"));
        assert!(coder.contains("# filename:"));
        assert!(coder.contains("TERMINATE"));

        let critics = engine
            .system_prompt(Role::Critics, "net.py", "LGTM")
            .expect("critics");
        assert!(critics.trim_end().ends_with("simply say LGTM"));

        assert!(
            engine
                .system_prompt(Role::User, "net.py", "LGTM")
                .expect("user")
                .is_empty()
        );
    }

    #[test]
    fn overrides_replace_built_ins() {
        let engine = PromptEngine::new(&PromptOverrides {
            critics: "Reply {{ sentinel }} when {{ artifact }} is right.".to_string(),
            ..PromptOverrides::default()
        });
        let critics = engine
            .system_prompt(Role::Critics, "model.py", "NO_ISSUES")
            .expect("critics");
        assert_eq!(critics, "Reply NO_ISSUES when model.py is right.");
        let commander = engine
            .system_prompt(Role::Commander, "model.py", "NO_ISSUES")
            .expect("commander");
        assert!(commander.starts_with("Help me run the code"));
    }

    #[test]
    fn broken_override_is_an_error() {
        let engine = PromptEngine::new(&PromptOverrides {
            coder: "{% if %}".to_string(),
            ..PromptOverrides::default()
        });
        assert!(engine.system_prompt(Role::Coder, "model.py", "X").is_err());
    }

    #[test]
    fn message_templates_embed_inputs() {
        let engine = engine();
        let create = engine.create_request("a tiny cnn").expect("create");
        assert_eq!(
            create,
            "Make a PyTorch model architecture based on the model description\n\ndescription:\na tiny cnn"
        );

        let review = engine
            .review_request("a tiny cnn", "import torch")
            .expect("review");
        assert!(review.starts_with("Check that the code is correct"));
        assert!(review.ends_with("code:\n```\nimport torch\n```"));

        let revision = engine
            .revision_request("import torch", "add dropout")
            .expect("revision");
        assert!(revision.contains("pytorch model code:\nimport torch"));
        assert!(revision.ends_with("feedback:\nadd dropout"));
    }
}
