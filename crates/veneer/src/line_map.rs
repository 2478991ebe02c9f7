//! Generated-line to source-line correlation.
//!
//! Engines translate template source into some executable form, and the shape
//! of that form rarely matches the source line for line. [`LineMap`] records,
//! for every line of generated code, the original source line it came from.
//! The map is consulted only when evaluation raises an error, to rewrite the
//! reported failure location back to the template author's file.

/// A table correlating generated executable-code lines to original source
/// lines. Both sides are 1-based.
///
/// Engines whose executable form mirrors the source (the common case for
/// interpreted segment programs) can use [`LineMap::identity`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMap {
    lines: Vec<usize>,
}

impl LineMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map where generated line `n` corresponds to source line `n`,
    /// for `line_count` lines.
    pub fn identity(line_count: usize) -> Self {
        Self {
            lines: (1..=line_count).collect(),
        }
    }

    /// Appends the mapping for the next generated line.
    pub fn push(&mut self, source_line: usize) {
        self.lines.push(source_line);
    }

    /// Source line for the given generated line, or `None` if the generated
    /// line is out of range.
    pub fn source_line(&self, generated_line: usize) -> Option<usize> {
        if generated_line == 0 {
            return None;
        }
        self.lines.get(generated_line - 1).copied()
    }

    /// Number of generated lines covered by this map.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True if the map covers no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
