//! Bytecode emission: the opcode vocabulary and the builder that writes it
//! into the session's shared code arena.

mod builder;
mod opcode;

pub use builder::{CodeBuilder, ExceptionEntry, JumpLabel, TryHandlerLabel};
pub use opcode::Opcode;
