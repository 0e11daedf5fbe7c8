//! Expression templates for open projections.
//!
//! A template interleaves literal text with `{path}` references evaluated
//! against the source row, e.g. `"{username} {age} {team.name}"`.

use ormrepo_proto::Row;

/// One piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Path(String),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template. An unterminated `{` is kept as literal text.
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}') else {
                break;
            };
            literal.push_str(&rest[..open]);
            let path = rest[open + 1..open + close].trim();
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Path(path.to_string()));
            rest = &rest[open + close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self {
            source: source.to_string(),
            segments,
        }
    }

    /// The template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Paths referenced by the template.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Path(p) => Some(p.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Render against a row. Absent or null values render as empty text.
    pub fn render(&self, row: &Row) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Path(path) => {
                    if let Some(value) = row.lookup(path) {
                        out.push_str(&value.to_string());
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_segments() {
        let template = Template::parse("{username} {age}!");
        assert_eq!(template.paths().collect::<Vec<_>>(), vec!["username", "age"]);
    }

    #[test]
    fn test_render_with_relation() {
        let template = Template::parse("{username} {age} {team.name}");
        let row = Row::new()
            .with("username", "m1")
            .with("age", 0)
            .with_relation("team", Some(Row::new().with("name", "teamA")));
        assert_eq!(template.render(&row), "m1 0 teamA");
    }

    #[test]
    fn test_render_missing_relation_as_empty() {
        let template = Template::parse("{username} {age} {team.name}");
        let row = Row::new()
            .with("username", "m1")
            .with("age", 0)
            .with_relation("team", None);
        assert_eq!(template.render(&row), "m1 0 ");
    }

    #[test]
    fn test_unterminated_brace_is_literal() {
        let template = Template::parse("a {b");
        assert_eq!(template.render(&Row::new()), "a {b");
        assert_eq!(template.paths().count(), 0);
    }
}
