//! The include-stack interface.
//!
//! This crate never touches the filesystem itself — loading a source file's
//! contents is an external collaborator's job, contracted through
//! [`SourceLoader`]. `IncludeStack` owns only the in-memory stack of
//! already-loaded buffers and the character-level cursor/line/column
//! bookkeeping the lexer needs.

use crate::error::{CompileError, CompileResult};

/// Loads the contents of a source file named by an `include` directive (or
/// the root file named on the command line). The only file I/O seam this
/// crate contracts.
pub trait SourceLoader {
    fn load(&mut self, path: &str) -> CompileResult<String>;
}

struct Frame {
    path: String,
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
}

/// A LIFO stack of open sources. Pushing an include makes it the active
/// frame; reaching its end pops back to the including file, transparently,
/// so the lexer can treat the whole stack as one character stream. The
/// outermost frame's end terminates parsing.
pub struct IncludeStack {
    frames: Vec<Frame>,
    /// A single character put back by the lexer after tentatively consuming
    /// it to disambiguate `/` from `//`/`/*` (no frame bookkeeping needed on
    /// put-back since it's always within the same frame it came from).
    putback: Option<char>,
}

impl IncludeStack {
    /// Starts a stack with `path`/`contents` as the root file.
    pub fn new(path: impl Into<String>, contents: String) -> Self {
        Self {
            frames: vec![Frame { path: path.into(), chars: contents.chars().collect(), pos: 0, line: 1, column: 1 }],
            putback: None,
        }
    }

    /// Un-consumes `c`, so the next `next_char`/`peek_char` sees it again.
    pub fn putback(&mut self, c: char) {
        debug_assert!(self.putback.is_none(), "only one character of putback is supported");
        self.putback = Some(c);
    }

    /// Pushes `path` as a new include, loading it via `loader`. Fails with
    /// [`CompileError::Io`] if the loader can't find or read it.
    pub fn push(&mut self, path: &str, loader: &mut dyn SourceLoader) -> CompileResult<()> {
        let contents = loader.load(path).map_err(|_| CompileError::io(format!("cannot open include file '{path}'")))?;
        self.frames.push(Frame { path: path.to_owned(), chars: contents.chars().collect(), pos: 0, line: 1, column: 1 });
        Ok(())
    }

    /// The name of the currently active source, for diagnostics.
    #[must_use]
    pub fn current_path(&self) -> &str {
        self.frames.last().map_or("<empty>", |f| f.path.as_str())
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.frames.last().map_or(0, |f| f.line)
    }

    #[must_use]
    pub fn column(&self) -> u32 {
        self.frames.last().map_or(0, |f| f.column)
    }

    /// Returns the next character, popping exhausted include frames as
    /// needed. `None` once the outermost frame is exhausted.
    pub fn next_char(&mut self) -> Option<char> {
        if let Some(c) = self.putback.take() {
            return Some(c);
        }
        loop {
            let frame = self.frames.last_mut()?;
            if frame.pos >= frame.chars.len() {
                if self.frames.len() == 1 {
                    return None;
                }
                self.frames.pop();
                continue;
            }
            let frame = self.frames.last_mut().expect("just checked non-empty");
            let c = frame.chars[frame.pos];
            frame.pos += 1;
            if c == '\n' {
                frame.line += 1;
                frame.column = 1;
            } else {
                frame.column += 1;
            }
            return Some(c);
        }
    }

    /// Looks at the next character without consuming it, without popping
    /// frames across an include boundary (an include's last character is
    /// never fused with the including file's first for lookahead purposes).
    #[must_use]
    pub fn peek_char(&self) -> Option<char> {
        if let Some(c) = self.putback {
            return Some(c);
        }
        let frame = self.frames.last()?;
        frame.chars.get(frame.pos).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MapLoader(ahash::AHashMap<String, String>);

    impl SourceLoader for MapLoader {
        fn load(&mut self, path: &str) -> CompileResult<String> {
            self.0.get(path).cloned().ok_or_else(|| CompileError::io("not found"))
        }
    }

    #[test]
    fn transparently_crosses_include_boundary() {
        let mut stack = IncludeStack::new("root", "ab".to_owned());
        let mut loader = MapLoader(ahash::AHashMap::from_iter([("inc.g".to_owned(), "XY".to_owned())]));
        assert_eq!(stack.next_char(), Some('a'));
        stack.push("inc.g", &mut loader).unwrap();
        assert_eq!(stack.next_char(), Some('X'));
        assert_eq!(stack.next_char(), Some('Y'));
        assert_eq!(stack.current_path(), "root");
        assert_eq!(stack.next_char(), Some('b'));
        assert_eq!(stack.next_char(), None);
    }

    #[test]
    fn missing_include_is_an_io_error() {
        let mut stack = IncludeStack::new("root", String::new());
        let mut loader = MapLoader(ahash::AHashMap::new());
        let err = stack.push("missing.g", &mut loader).unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
    }
}
