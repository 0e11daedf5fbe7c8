//! Byte-offset spans for diagnostics.

/// A half-open byte range in the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start byte offset.
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both spans.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Zero-width span at the end of `source`.
    pub fn eof(source: &str) -> Span {
        Span::new(source.len(), source.len())
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(range: std::ops::Range<usize>) -> Self {
        Span::new(range.start, range.end)
    }
}

/// 1-based column of a byte offset. Query strings are single-line in practice.
pub fn column_of(source: &str, offset: usize) -> usize {
    let line_start = source[..offset.min(source.len())]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    source[line_start..offset.min(source.len())].chars().count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        assert_eq!(Span::new(4, 9).merge(Span::new(7, 20)), Span::new(4, 20));
    }

    #[test]
    fn test_column_of() {
        let source = "select m\nfrom Member m";
        assert_eq!(column_of(source, 0), 1);
        assert_eq!(column_of(source, 7), 8);
        assert_eq!(column_of(source, 9), 1);
        assert_eq!(column_of(source, 14), 6);
    }
}
