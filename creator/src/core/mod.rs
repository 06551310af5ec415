//! Deterministic, pure logic shared by the creator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data (reply text, conversation turns) and return deterministic outputs
//! suitable for tests.

pub mod code_blocks;
pub mod conversation;
pub mod description;
pub mod digest;
pub mod exit_code;
pub mod sentinel;
pub mod termination;
pub mod types;
