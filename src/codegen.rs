//! Vertex program code fragments.

pub mod template;

pub use template::CodeTemplate;

use crate::register::Register;
use std::fmt;

/// A sequence of vertex program instructions, one per line, of the form
/// `op dest, src[, src]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodeFragment {
    lines: Vec<String>,
}

impl CodeFragment {
    /// Creates an empty fragment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fragment from resolved source code. Blank lines and
    /// surrounding whitespace are dropped.
    pub fn from_source(source: &str) -> Self {
        Self {
            lines: source
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(ToString::to_string)
                .collect(),
        }
    }

    pub fn push_line<S: ToString>(&mut self, line: S) {
        self.lines.push(line.to_string());
    }

    /// Appends all lines of the given fragment to this one.
    pub fn append(&mut self, other: &Self) {
        self.lines.extend(other.lines.iter().cloned());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn n_instructions(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for CodeFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// Returns the operand string for the given components of a register, for
/// example `vt0.xyz`.
pub fn swizzled(register: Register, components: &str) -> String {
    format!("{}.{}", register, components)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::register::RegisterKind;

    #[test]
    fn fragment_from_source_drops_blank_lines_and_indentation() {
        let fragment = CodeFragment::from_source("\n    mov vt0, va0\n\n  add vt0, vt0, vc1\n");
        assert_eq!(fragment.lines(), ["mov vt0, va0", "add vt0, vt0, vc1"]);
    }

    #[test]
    fn appending_fragments_concatenates_lines() {
        let mut fragment = CodeFragment::from_source("mov vt0, va0");
        fragment.append(&CodeFragment::from_source("mov v0, vt1"));
        assert_eq!(fragment.n_instructions(), 2);
        assert_eq!(fragment.to_string(), "mov vt0, va0\nmov v0, vt1\n");
    }

    #[test]
    fn swizzled_operand_appends_components() {
        assert_eq!(
            swizzled(Register::new(RegisterKind::Temp, 2), "xyz"),
            "vt2.xyz"
        );
    }
}
