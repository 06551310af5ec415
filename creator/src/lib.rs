//! Iterative model-code generation with cooperating LLM agents.
//!
//! A commander relays a paper description to a coder, executes the code it
//! writes, and asks a critics agent to review the result until the critics
//! approve or the round budget runs out. The crate is split the usual way:
//!
//! - **[`core`]**: Pure, deterministic logic (conversation log, code block
//!   parsing, sentinel detection). No I/O.
//! - **[`io`]**: Side-effecting operations (chat API, code execution,
//!   filesystem records). Behind traits where tests need doubles.
//! - **[`agents`]**: Agent definitions and the exchanges between them.
//!
//! [`looping`] drives the critique/revise rounds and [`create`] wires a full
//! run together for the CLI.

pub mod agents;
pub mod core;
pub mod create;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
