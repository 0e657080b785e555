//! Emits bytecode for one function/method directly into the session's
//! shared code arena.
//!
//! Unlike a compiler that builds one bytecode buffer per function and links
//! them afterward, this language's image keeps every function's bytecode in
//! a single linear code region (spec: "each function's entry is the offset
//! recorded in its symbol"), so the builder is a thin cursor over the
//! session's [`crate::arena::CodeArena`] rather than an owner of its own
//! buffer.

use crate::arena::{CodeArena, CodeOffset};
use crate::error::{CompileError, CompileResult};

use super::opcode::Opcode;

/// An exception-table entry: a protected bytecode range and where to jump
/// (and how far to unwind the operand stack) if it throws. Entries are
/// added innermost-first for nested `try` blocks.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionEntry {
    pub protected_start: CodeOffset,
    pub protected_end: CodeOffset,
    pub handler: CodeOffset,
    pub catch_slot: u16,
    pub unwind_depth: u16,
}

/// A forward branch awaiting its target. Stores the offset of the opcode
/// byte itself, since the i16 operand immediately follows it.
#[derive(Debug, Clone, Copy)]
pub struct JumpLabel(CodeOffset);

/// A `TryPush` awaiting its handler's absolute code offset.
#[derive(Debug, Clone, Copy)]
pub struct TryHandlerLabel(CodeOffset);

/// Emits opcodes and operands into a borrowed code arena, tracking exception
/// entries for the function currently being compiled.
pub struct CodeBuilder<'a> {
    code: &'a mut CodeArena,
    exception_table: Vec<ExceptionEntry>,
}

impl<'a> CodeBuilder<'a> {
    pub fn new(code: &'a mut CodeArena) -> Self {
        Self { code, exception_table: Vec::new() }
    }

    #[must_use]
    pub fn current_offset(&self) -> CodeOffset {
        self.code.offset()
    }

    pub fn emit(&mut self, op: Opcode) -> CompileResult<()> {
        self.code.push_u8(op as u8)
    }

    pub fn emit_u8(&mut self, op: Opcode, operand: u8) -> CompileResult<()> {
        self.code.push_u8(op as u8)?;
        self.code.push_u8(operand)
    }

    pub fn emit_u16(&mut self, op: Opcode, operand: u16) -> CompileResult<()> {
        self.code.push_u8(op as u8)?;
        self.code.push_bytes(&operand.to_le_bytes())
    }

    pub fn emit_i32(&mut self, op: Opcode, operand: i32) -> CompileResult<()> {
        self.code.push_u8(op as u8)?;
        self.code.push_bytes(&operand.to_le_bytes())
    }

    pub fn emit_u32(&mut self, op: Opcode, operand: u32) -> CompileResult<()> {
        self.code.push_u8(op as u8)?;
        self.code.push_bytes(&operand.to_le_bytes())
    }

    /// Emits a call/dispatch opcode with a byte argument count.
    pub fn emit_call(&mut self, op: Opcode, argc: u8) -> CompileResult<()> {
        self.emit_u8(op, argc)
    }

    /// Emits a forward branch with a placeholder offset, returning a label
    /// to patch once the target is known.
    pub fn emit_jump(&mut self, op: Opcode) -> CompileResult<JumpLabel> {
        let label = JumpLabel(self.code.offset());
        self.code.push_u8(op as u8)?;
        self.code.push_bytes(&0i16.to_le_bytes())?;
        Ok(label)
    }

    /// Patches a forward branch to target the current position.
    pub fn patch_jump(&mut self, label: JumpLabel) -> CompileResult<()> {
        let target = self.code.offset();
        self.patch_branch_at(label.0, target)
    }

    /// Emits a branch to an already-known (necessarily earlier) target,
    /// such as a loop's back-edge.
    pub fn emit_jump_to(&mut self, op: Opcode, target: CodeOffset) -> CompileResult<()> {
        let site = self.code.offset();
        self.code.push_u8(op as u8)?;
        self.code.push_bytes(&0i16.to_le_bytes())?;
        self.patch_branch_at(site, target)
    }

    fn patch_branch_at(&mut self, site: CodeOffset, target: CodeOffset) -> CompileResult<()> {
        let raw = target as i64 - (site as i64 + 3);
        let offset: i16 = raw.try_into().map_err(|_| CompileError::resource("branch out of range"))?;
        self.code.patch(site + 1, &offset.to_le_bytes());
        Ok(())
    }

    /// Emits a `TryPush` frame with a placeholder handler offset, returning a
    /// label to patch once the `catch` body's position is known (`TryPush`
    /// must precede the protected body, which precedes the handler it names,
    /// so the handler offset is never available at the point of emission).
    /// `catch_slot` is the local slot the VM stores the caught value into
    /// before transferring control to the handler.
    pub fn emit_try_push(&mut self, catch_slot: u16, unwind_depth: u16) -> CompileResult<TryHandlerLabel> {
        let label = TryHandlerLabel(self.code.offset());
        self.code.push_u8(Opcode::TryPush as u8)?;
        self.code.push_bytes(&0u32.to_le_bytes())?;
        self.code.push_bytes(&catch_slot.to_le_bytes())?;
        self.code.push_bytes(&unwind_depth.to_le_bytes())?;
        Ok(label)
    }

    /// Patches a `TryPush`'s handler operand with the now-known absolute
    /// offset of its `catch` body.
    pub fn patch_try_handler(&mut self, label: TryHandlerLabel, handler: CodeOffset) {
        self.code.patch(label.0 + 1, &handler.to_le_bytes());
    }

    pub fn add_exception_entry(&mut self, entry: ExceptionEntry) {
        self.exception_table.push(entry);
    }

    #[must_use]
    pub fn exception_table(&self) -> &[ExceptionEntry] {
        &self.exception_table
    }

    /// Splices in raw bytes produced by an `asm { ... }` block, verbatim.
    pub fn splice_raw(&mut self, bytes: &[u8]) -> CompileResult<()> {
        self.code.push_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_jump_patches_to_current_offset() {
        let mut code = CodeArena::new(1024);
        let mut b = CodeBuilder::new(&mut code);
        let label = b.emit_jump(Opcode::JumpIfFalse).unwrap();
        b.emit(Opcode::TrapNewline).unwrap();
        b.patch_jump(label).unwrap();
        let bytes = code.bytes();
        assert_eq!(bytes[0], Opcode::JumpIfFalse as u8);
        let offset = i16::from_le_bytes([bytes[1], bytes[2]]);
        assert_eq!(offset, 1);
    }

    #[test]
    fn backward_jump_targets_loop_head() {
        let mut code = CodeArena::new(1024);
        let mut b = CodeBuilder::new(&mut code);
        let head = b.current_offset();
        b.emit(Opcode::TrapNewline).unwrap();
        b.emit_jump_to(Opcode::Jump, head).unwrap();
        let bytes = code.bytes();
        let site = 1usize;
        let offset = i16::from_le_bytes([bytes[site + 1], bytes[site + 2]]);
        assert_eq!(offset, -3);
    }
}
