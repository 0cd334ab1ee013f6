//! Finalized programs.

use std::rc::Rc;

use super::code::Code;

/// A finalized, immutable program.
///
/// Programs are produced by `ProgramBuilder::finalize`, owned by corpora and
/// mutation pipelines, and shared read-only (via [`Rc`]) while serving as
/// splice donors. The parent pointer records lineage: the program this one
/// was derived from by mutation, if any.
#[derive(Debug, Clone, Default)]
pub struct Program {
    code: Code,
    parent: Option<Rc<Program>>,
    comments: Vec<String>,
    contributors: Vec<&'static str>,
}

impl Program {
    /// Wraps finalized code into a program.
    #[must_use]
    pub fn new(code: Code) -> Self {
        Self {
            code,
            parent: None,
            comments: Vec::new(),
            contributors: Vec::new(),
        }
    }

    /// The program's code.
    #[inline]
    #[must_use]
    pub fn code(&self) -> &Code {
        &self.code
    }

    /// Number of instructions.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.code.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// The program this one was derived from, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Rc<Program>> {
        self.parent.as_ref()
    }

    /// Records the lineage parent.
    pub fn set_parent(&mut self, parent: Rc<Program>) {
        self.parent = Some(parent);
    }

    /// Free-form comments attached to the program.
    #[must_use]
    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    pub fn add_comment(&mut self, comment: impl Into<String>) {
        self.comments.push(comment.into());
    }

    /// Names of the code generators and mutators that contributed to this
    /// program, for statistics.
    #[must_use]
    pub fn contributors(&self) -> &[&'static str] {
        &self.contributors
    }

    pub fn record_contributor(&mut self, name: &'static str) {
        if !self.contributors.contains(&name) {
            self.contributors.push(name);
        }
    }
}
