//! Query derivation from method names.
//!
//! A method name such as `findTop3DistinctByTeamNameAndAgeGreaterThanOrderByUsernameDesc`
//! splits into a subject (`find`, `Top3`, `Distinct`), a predicate of
//! property/operator parts joined by `And` / `Or`, and a static ordering.

use ormrepo_proto::{OrderDirection, OrderSpec};

use super::descriptor::{Arg, Clause, Predicate};
use crate::catalog::{uncapitalize, Catalog};
use crate::error::{Error, Result};
use crate::storage::ClauseOp;

/// What a derived method does with its matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Find,
    Count,
    Exists,
    Delete,
}

/// A parsed method name.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedQuery {
    pub subject: Subject,
    pub distinct: bool,
    pub limit: Option<u32>,
    pub predicate: Option<Predicate>,
    pub order: Vec<OrderSpec>,
    /// Number of call arguments the predicate consumes.
    pub arity: usize,
    /// Property path of each argument, in order.
    pub arg_fields: Vec<String>,
}

const SUBJECTS: &[(&str, Subject)] = &[
    ("find", Subject::Find),
    ("read", Subject::Find),
    ("get", Subject::Find),
    ("query", Subject::Find),
    ("search", Subject::Find),
    ("stream", Subject::Find),
    ("count", Subject::Count),
    ("exists", Subject::Exists),
    ("delete", Subject::Delete),
    ("remove", Subject::Delete),
];

/// Operator keywords, longest first so that `GreaterThanEqual` wins over
/// `GreaterThan` and `IsNotNull` over `NotNull`.
const OPERATORS: &[(&str, ClauseOp)] = &[
    ("IsGreaterThanEqual", ClauseOp::Ge),
    ("IsNotContaining", ClauseOp::NotContaining),
    ("IsLessThanEqual", ClauseOp::Le),
    ("GreaterThanEqual", ClauseOp::Ge),
    ("IsStartingWith", ClauseOp::StartingWith),
    ("IsGreaterThan", ClauseOp::Gt),
    ("NotContaining", ClauseOp::NotContaining),
    ("IsEndingWith", ClauseOp::EndingWith),
    ("IsContaining", ClauseOp::Containing),
    ("LessThanEqual", ClauseOp::Le),
    ("StartingWith", ClauseOp::StartingWith),
    ("GreaterThan", ClauseOp::Gt),
    ("IsLessThan", ClauseOp::Lt),
    ("EndingWith", ClauseOp::EndingWith),
    ("Containing", ClauseOp::Containing),
    ("IsNotLike", ClauseOp::NotLike),
    ("IsNotNull", ClauseOp::IsNotNull),
    ("StartsWith", ClauseOp::StartingWith),
    ("IsBetween", ClauseOp::Between),
    ("LessThan", ClauseOp::Lt),
    ("EndsWith", ClauseOp::EndingWith),
    ("Contains", ClauseOp::Containing),
    ("IsBefore", ClauseOp::Lt),
    ("NotLike", ClauseOp::NotLike),
    ("NotNull", ClauseOp::IsNotNull),
    ("IsNotIn", ClauseOp::NotIn),
    ("Between", ClauseOp::Between),
    ("IsAfter", ClauseOp::Gt),
    ("IsFalse", ClauseOp::False),
    ("IsLike", ClauseOp::Like),
    ("IsNull", ClauseOp::IsNull),
    ("IsTrue", ClauseOp::True),
    ("Equals", ClauseOp::Eq),
    ("Before", ClauseOp::Lt),
    ("IsNot", ClauseOp::Ne),
    ("After", ClauseOp::Gt),
    ("False", ClauseOp::False),
    ("NotIn", ClauseOp::NotIn),
    ("Like", ClauseOp::Like),
    ("Null", ClauseOp::IsNull),
    ("True", ClauseOp::True),
    ("IsIn", ClauseOp::In),
    ("Not", ClauseOp::Ne),
    ("Is", ClauseOp::Eq),
    ("In", ClauseOp::In),
];

/// Parse a method name against the root entity.
pub fn derive(catalog: &Catalog, entity: &str, method: &str) -> Result<DerivedQuery> {
    let root = catalog.entity(entity)?;
    let (subject, rest) = SUBJECTS
        .iter()
        .find_map(|(prefix, subject)| {
            method
                .strip_prefix(prefix)
                .filter(|rest| rest.is_empty() || starts_upper(rest))
                .map(|rest| (*subject, rest))
        })
        .ok_or_else(|| {
            Error::resolution(format!(
                "'{}' does not start with a query subject (find, count, exists, delete, ...)",
                method
            ))
        })?;

    let (subject_text, criteria) = match find_keyword(rest, "By") {
        Some(idx) => (&rest[..idx], &rest[idx + 2..]),
        None => (rest, ""),
    };
    let distinct = subject_text.contains("Distinct");
    let limit = parse_limit(subject_text)?;

    let (criteria, order_text) = match find_keyword(criteria, "OrderBy") {
        Some(idx) => (&criteria[..idx], Some(&criteria[idx + 7..])),
        None => (criteria, None),
    };

    let mut next_param = 0usize;
    let mut arg_fields = Vec::new();
    let predicate = if criteria.is_empty() {
        None
    } else {
        let mut or_parts = Vec::new();
        for or_part in split_keyword(criteria, "Or") {
            let mut and_parts = Vec::new();
            for part in split_keyword(or_part, "And") {
                let clause = parse_part(catalog, &root.name, part, &mut next_param)?;
                for _ in 0..clause.args.len() {
                    arg_fields.push(clause.field.clone());
                }
                and_parts.push(Predicate::Clause(clause));
            }
            or_parts.push(if and_parts.len() == 1 {
                and_parts.remove(0)
            } else {
                Predicate::And(and_parts)
            });
        }
        Some(if or_parts.len() == 1 {
            or_parts.remove(0)
        } else {
            Predicate::Or(or_parts)
        })
    };

    let order = match order_text {
        Some(text) => parse_order(catalog, &root.name, text)?,
        None => Vec::new(),
    };

    Ok(DerivedQuery {
        subject,
        distinct,
        limit,
        predicate,
        order,
        arity: next_param,
        arg_fields,
    })
}

fn starts_upper(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Position of `keyword` where it starts a new camel-case word and is
/// followed by an upper-case letter or the end of the input.
fn find_keyword(s: &str, keyword: &str) -> Option<usize> {
    s.match_indices(keyword)
        .map(|(idx, _)| idx)
        .find(|&idx| is_word_boundary(s, idx, keyword))
}

fn is_word_boundary(s: &str, idx: usize, keyword: &str) -> bool {
    let after = &s[idx + keyword.len()..];
    after.is_empty() || starts_upper(after)
}

/// Split on `keyword` occurrences that sit between two non-empty words.
fn split_keyword<'a>(s: &'a str, keyword: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (idx, _) in s.match_indices(keyword) {
        let after = &s[idx + keyword.len()..];
        if idx > start && starts_upper(after) {
            parts.push(&s[start..idx]);
            start = idx + keyword.len();
        }
    }
    parts.push(&s[start..]);
    parts
}

fn parse_limit(subject: &str) -> Result<Option<u32>> {
    for keyword in ["First", "Top"] {
        if let Some(idx) = subject.find(keyword) {
            let digits: String = subject[idx + keyword.len()..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if digits.is_empty() {
                return Ok(Some(1));
            }
            let limit: u32 = digits
                .parse()
                .map_err(|_| Error::resolution(format!("invalid limit '{}{}'", keyword, digits)))?;
            if limit == 0 {
                return Err(Error::resolution(format!("{}0 selects nothing", keyword)));
            }
            return Ok(Some(limit));
        }
    }
    Ok(None)
}

fn parse_part(catalog: &Catalog, root: &str, part: &str, next_param: &mut usize) -> Result<Clause> {
    let (property, op) = OPERATORS
        .iter()
        .find_map(|(keyword, op)| {
            part.strip_suffix(keyword)
                .filter(|prop| !prop.is_empty())
                .map(|prop| (prop, *op))
        })
        .unwrap_or((part, ClauseOp::Eq));

    let field = match catalog.resolve_property_token(root, property) {
        Some(field) => field,
        // `LoginIn` could be a property `loginIn` or `login` + `In`
        None => match catalog.resolve_property_token(root, part) {
            Some(field) => return Ok(clause(field, ClauseOp::Eq, next_param)),
            None => {
                return Err(Error::resolution(format!(
                    "no property '{}' found for type '{}'",
                    uncapitalize(property),
                    root
                )))
            }
        },
    };
    Ok(clause(field, op, next_param))
}

fn clause(field: String, op: ClauseOp, next_param: &mut usize) -> Clause {
    let args = (0..op.arity())
        .map(|_| {
            let arg = Arg::Param(*next_param);
            *next_param += 1;
            arg
        })
        .collect();
    Clause { field, op, args }
}

fn parse_order(catalog: &Catalog, root: &str, text: &str) -> Result<Vec<OrderSpec>> {
    let mut specs = Vec::new();
    let mut start = 0;
    let mut idx = 0;
    while idx < text.len() {
        let rest = &text[idx..];
        let direction = if rest.starts_with("Desc") && is_word_boundary(text, idx, "Desc") {
            Some((OrderDirection::Desc, 4))
        } else if rest.starts_with("Asc") && is_word_boundary(text, idx, "Asc") {
            Some((OrderDirection::Asc, 3))
        } else {
            None
        };
        match direction {
            Some((direction, len)) if idx > start => {
                specs.push(order_spec(catalog, root, &text[start..idx], direction)?);
                idx += len;
                start = idx;
            }
            _ => idx += rest.chars().next().map_or(1, char::len_utf8),
        }
    }
    if start < text.len() {
        specs.push(order_spec(catalog, root, &text[start..], OrderDirection::Asc)?);
    }
    if specs.is_empty() {
        return Err(Error::resolution("OrderBy without a property".to_string()));
    }
    Ok(specs)
}

fn order_spec(
    catalog: &Catalog,
    root: &str,
    token: &str,
    direction: OrderDirection,
) -> Result<OrderSpec> {
    let field = catalog.resolve_property_token(root, token).ok_or_else(|| {
        Error::resolution(format!(
            "no property '{}' found for type '{}'",
            uncapitalize(token),
            root
        ))
    })?;
    Ok(OrderSpec { field, direction })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model;

    fn derive_member(method: &str) -> Result<DerivedQuery> {
        derive(&model::catalog(), "Member", method)
    }

    fn clause_of(predicate: &Predicate) -> &Clause {
        match predicate {
            Predicate::Clause(c) => c,
            other => panic!("expected a single clause, got {:?}", other),
        }
    }

    #[test]
    fn test_simple_equality() {
        let derived = derive_member("findByUsername").unwrap();
        assert_eq!(derived.subject, Subject::Find);
        assert_eq!(derived.arity, 1);
        let clause = clause_of(derived.predicate.as_ref().unwrap());
        assert_eq!(clause.field, "username");
        assert_eq!(clause.op, ClauseOp::Eq);
        assert_eq!(clause.args, vec![Arg::Param(0)]);
    }

    #[test]
    fn test_and_or_structure() {
        let derived = derive_member("findByUsernameAndAgeGreaterThanOrAgeLessThan").unwrap();
        assert_eq!(derived.arity, 3);
        let Some(Predicate::Or(parts)) = derived.predicate else {
            panic!("expected or");
        };
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[0], Predicate::And(items) if items.len() == 2));
        let last = clause_of(&parts[1]);
        assert_eq!(last.op, ClauseOp::Lt);
        assert_eq!(last.args, vec![Arg::Param(2)]);
    }

    #[test]
    fn test_descriptive_subject_text_is_ignored() {
        for method in [
            "findMemberByUsername",
            "findFetchByUsername",
            "findReadOnlyByUsername",
            "findProjectionsByUsername",
        ] {
            let derived = derive_member(method).unwrap();
            assert_eq!(clause_of(derived.predicate.as_ref().unwrap()).field, "username");
        }
    }

    #[test]
    fn test_nested_property() {
        let derived = derive_member("findByTeamName").unwrap();
        assert_eq!(clause_of(derived.predicate.as_ref().unwrap()).field, "team.name");
    }

    #[test]
    fn test_operators_without_arguments_and_between() {
        let derived = derive_member("findByUsernameIsNotNullAndAgeBetween").unwrap();
        assert_eq!(derived.arity, 2);
        let clauses = derived.predicate.as_ref().unwrap().clauses();
        assert_eq!(clauses[0].op, ClauseOp::IsNotNull);
        assert!(clauses[0].args.is_empty());
        assert_eq!(clauses[1].op, ClauseOp::Between);
        assert_eq!(clauses[1].args, vec![Arg::Param(0), Arg::Param(1)]);
    }

    #[test]
    fn test_subject_modifiers() {
        let derived = derive_member("findTop3DistinctByAgeGreaterThanEqual").unwrap();
        assert_eq!(derived.limit, Some(3));
        assert!(derived.distinct);
        assert_eq!(clause_of(derived.predicate.as_ref().unwrap()).op, ClauseOp::Ge);

        assert_eq!(derive_member("findFirstByAge").unwrap().limit, Some(1));
        assert_eq!(derive_member("countByAge").unwrap().subject, Subject::Count);
        assert_eq!(derive_member("existsByUsername").unwrap().subject, Subject::Exists);
        assert_eq!(derive_member("deleteByUsername").unwrap().subject, Subject::Delete);
    }

    #[test]
    fn test_static_order() {
        let derived = derive_member("findByAgeOrderByUsernameDescAgeAsc").unwrap();
        assert_eq!(
            derived.order,
            vec![OrderSpec::desc("username"), OrderSpec::asc("age")]
        );
        let derived = derive_member("findByAgeOrderByUsername").unwrap();
        assert_eq!(derived.order, vec![OrderSpec::asc("username")]);
    }

    #[test]
    fn test_unknown_property_names_token() {
        let err = derive_member("findByNickname").unwrap_err();
        assert!(matches!(err, Error::Resolution(ref m) if m.contains("nickname")));
        let err = derive_member("findByUsernameAndNicknameLike").unwrap_err();
        assert!(matches!(err, Error::Resolution(ref m) if m.contains("nickname")));
    }

    #[test]
    fn test_unknown_subject() {
        assert!(matches!(
            derive_member("lookupByUsername"),
            Err(Error::Resolution(_))
        ));
    }

    #[test]
    fn test_no_criteria() {
        let derived = derive_member("findAll").unwrap();
        assert!(derived.predicate.is_none());
        assert_eq!(derived.arity, 0);
    }
}
