use std::fmt;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn join(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Byte offsets of every line start, used to turn spans into line/column pairs.
#[derive(Clone, Debug)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (offset, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push(offset + 1);
            }
        }
        Self { line_starts }
    }

    /// One-based line and column of a byte offset.
    pub fn position(&self, offset: usize) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        Position {
            line: line + 1,
            column: offset - self.line_starts[line] + 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub file: Rc<str>,
    pub span: Span,
    pub start: Position,
    pub end: Position,
}

impl Location {
    pub fn new(file: Rc<str>, span: Span, lines: &LineIndex) -> Self {
        Self {
            file,
            span,
            start: lines.position(span.start),
            end: lines.position(span.end),
        }
    }

    pub fn extend_with(&self, other: &Location) -> Location {
        let (start, start_span) = if other.span.start < self.span.start {
            (other.start, other.span.start)
        } else {
            (self.start, self.span.start)
        };
        let (end, end_span) = if other.span.end > self.span.end {
            (other.end, other.span.end)
        } else {
            (self.end, self.span.end)
        };
        Location {
            file: self.file.clone(),
            span: Span::new(start_span, end_span),
            start,
            end,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end || self.start.line == self.end.line {
            write!(f, "{}:{}:{}", self.file, self.start.line, self.start.column)
        } else {
            write!(
                f,
                "{}:(from {}:{} to {}:{})",
                self.file, self.start.line, self.start.column, self.end.line, self.end.column
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based() {
        let lines = LineIndex::new("val a = 1\nval b = 2\n");
        assert_eq!(lines.position(0), Position { line: 1, column: 1 });
        assert_eq!(lines.position(10), Position { line: 2, column: 1 });
        assert_eq!(lines.position(14), Position { line: 2, column: 5 });
    }

    #[test]
    fn multi_line_locations_show_both_ends() {
        let lines = LineIndex::new("class A {\n  def a: Int\n}");
        let file: Rc<str> = Rc::from("a.ph");
        let head = Location::new(file.clone(), Span::new(0, 5), &lines);
        let tail = Location::new(file, Span::new(23, 24), &lines);

        assert_eq!(head.to_string(), "a.ph:1:1");
        assert_eq!(head.extend_with(&tail).to_string(), "a.ph:(from 1:1 to 3:2)");
    }
}
