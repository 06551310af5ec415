//! Optional pre-pass that condenses the paper description.

use anyhow::Result;
use tracing::{info, instrument};

use crate::agents::Agent;
use crate::agents::session::{Session, ask};
use crate::core::types::{Phase, Role};
use crate::io::human::{HumanInput, ends_dialogue};
use crate::io::llm::ChatBackend;

/// Prompt shown to the operator after each interpreter reply.
pub const HUMAN_PROMPT: &str =
    "Provide feedback to Interpreter. Press enter or type 'exit' to use the current interpretation: ";

/// Send the description to the interpreter and return its last reply.
///
/// With `human` set, the operator may keep refining the interpretation; an
/// empty line or `exit` ends the dialogue. The reply is not validated.
#[instrument(skip_all, fields(interactive = human.is_some()))]
pub fn interpret<B: ChatBackend>(
    session: &mut Session,
    backend: &B,
    interpreter: &Agent,
    description: &str,
    human: Option<&dyn HumanInput>,
) -> Result<String> {
    session.phase = Phase::Interpret;
    let mut interpretation = ask(session, backend, Role::User, interpreter, description)?;
    if let Some(human) = human {
        loop {
            let answer = human.ask(HUMAN_PROMPT)?;
            if ends_dialogue(&answer) {
                break;
            }
            interpretation = ask(session, backend, Role::User, interpreter, &answer)?;
        }
    }
    info!(bytes = interpretation.len(), "interpretation ready");
    Ok(interpretation)
}
