//! Placeholder templates.
//!
//! Templates use brace-delimited fields, the same shape as format strings:
//!
//! - `{name}` is replaced with the value bound to `name`
//! - `{name!r}` is replaced with the value as a quoted SQL string literal
//! - `{{` and `}}` produce literal braces
//!
//! Positional fields (`{}`, `{0}`), attribute/index lookups and format specs
//! are rejected when the template is parsed.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_till1},
    character::complete::char,
    combinator::{map, value},
    sequence::delimited,
    IResult,
};

use crate::error::{Error, Result};

/// How a field value is written into the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Conversion {
    /// Written as-is (`{name}` or `{name!s}`).
    #[default]
    Str,
    /// Written as a single-quoted SQL literal (`{name!r}`).
    Repr,
}

/// A named placeholder in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field<'a> {
    pub name: &'a str,
    pub conversion: Conversion,
    /// Byte offset of the opening brace.
    pub offset: usize,
}

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Brace(char),
    Field(Field<'a>),
}

/// Raw token before field analysis.
#[derive(Debug, Clone)]
enum Raw<'a> {
    Literal(&'a str),
    Brace(char),
    Field(&'a str),
}

fn raw_segment(input: &str) -> IResult<&str, Raw<'_>> {
    alt((
        value(Raw::Brace('{'), tag("{{")),
        value(Raw::Brace('}'), tag("}}")),
        map(
            delimited(char('{'), take_till(|c: char| c == '{' || c == '}'), char('}')),
            Raw::Field,
        ),
        map(take_till1(|c: char| c == '{' || c == '}'), Raw::Literal),
    ))(input)
}

/// A parsed template, borrowing from its source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template<'a> {
    source: &'a str,
    segments: Vec<Segment<'a>>,
}

impl<'a> Template<'a> {
    /// Parse a template, failing on malformed or unsupported fields.
    pub fn parse(source: &'a str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = source;

        while !rest.is_empty() {
            let offset = source.len() - rest.len();
            match raw_segment(rest) {
                Ok((remaining, raw)) => {
                    segments.push(match raw {
                        Raw::Literal(text) => Segment::Literal(text),
                        Raw::Brace(c) => Segment::Brace(c),
                        Raw::Field(inner) => Segment::Field(parse_field(inner, offset)?),
                    });
                    rest = remaining;
                }
                Err(_) => {
                    let message = if rest.starts_with('}') {
                        "single '}' encountered in template"
                    } else {
                        "unmatched '{' in template"
                    };
                    return Err(Error::Template {
                        offset,
                        message: message.to_string(),
                    });
                }
            }
        }

        Ok(Self { source, segments })
    }

    /// The raw template text.
    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn segments(&self) -> &[Segment<'a>] {
        &self.segments
    }

    /// Distinct placeholder names, sorted.
    pub fn keys(&self) -> BTreeSet<String> {
        self.fields().map(|f| f.name.to_string()).collect()
    }

    fn fields(&self) -> impl Iterator<Item = &Field<'a>> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(f) => Some(f),
            _ => None,
        })
    }

    /// Pick the values this template references out of a larger pool.
    ///
    /// Fails with [`Error::MissingKeys`] when any placeholder has no value.
    pub fn resolve(&self, pool: &HashMap<String, String>) -> Result<BTreeMap<String, String>> {
        let keys = self.keys();
        let missing: Vec<String> = keys.iter().filter(|k| !pool.contains_key(*k)).cloned().collect();
        if !missing.is_empty() {
            return Err(Error::MissingKeys(missing));
        }
        Ok(keys
            .into_iter()
            .map(|k| {
                let v = pool[&k].clone();
                (k, v)
            })
            .collect())
    }

    /// Substitute every field with its value.
    pub fn render(&self, values: &BTreeMap<String, String>) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        let mut missing = BTreeSet::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Brace(c) => out.push(*c),
                Segment::Field(field) => match values.get(field.name) {
                    Some(v) => match field.conversion {
                        Conversion::Str => out.push_str(v),
                        Conversion::Repr => out.push_str(&quote_literal(v)),
                    },
                    None => {
                        missing.insert(field.name.to_string());
                    }
                },
            }
        }

        if missing.is_empty() {
            Ok(out)
        } else {
            Err(Error::MissingKeys(missing.into_iter().collect()))
        }
    }
}

fn parse_field(inner: &str, offset: usize) -> Result<Field<'_>> {
    let fail = |message: &str| Error::Template {
        offset,
        message: message.to_string(),
    };

    let name_end = inner.find(['!', ':']).unwrap_or(inner.len());
    let (name, tail) = inner.split_at(name_end);

    if name.is_empty() || name.chars().all(|c| c.is_ascii_digit()) {
        return Err(fail("positional placeholders are not supported"));
    }
    if name.contains(['.', '[']) {
        return Err(fail("attribute and index lookups are not supported"));
    }

    let (conversion, spec) = match tail.strip_prefix('!') {
        Some(conv) => {
            let mut chars = conv.chars();
            let conversion = match chars.next() {
                Some('s') => Conversion::Str,
                Some('r') | Some('a') => Conversion::Repr,
                _ => return Err(fail("expected conversion 's', 'r' or 'a' after '!'")),
            };
            let after = chars.as_str();
            if !after.is_empty() && !after.starts_with(':') {
                return Err(fail("expected ':' or '}' after conversion"));
            }
            (conversion, after)
        }
        None => (Conversion::Str, tail),
    };

    if spec.len() > 1 {
        return Err(fail("format specs are not supported"));
    }

    Ok(Field {
        name,
        conversion,
        offset,
    })
}

/// Quote a value as a SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Distinct placeholder names in `s`.
pub fn parse_keys(s: &str) -> Result<BTreeSet<String>> {
    Ok(Template::parse(s)?.keys())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_parse_keys() {
        let keys = parse_keys("SELECT {col} FROM {table} WHERE {col} > 1").unwrap();
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec!["col", "table"]);
    }

    #[test]
    fn test_no_placeholders() {
        assert!(parse_keys("SELECT 42").unwrap().is_empty());
        assert!(parse_keys("").unwrap().is_empty());
    }

    #[test]
    fn test_escaped_braces_are_not_keys() {
        let t = Template::parse("SELECT '{{\"a\": {n}}}'::JSON").unwrap();
        assert_eq!(t.keys().len(), 1);
        let out = t.render(&values(&[("n", "1")])).unwrap();
        assert_eq!(out, "SELECT '{\"a\": 1}'::JSON");
    }

    #[test]
    fn test_render() {
        let t = Template::parse("SELECT * FROM {table}").unwrap();
        let out = t.render(&values(&[("table", "orders")])).unwrap();
        assert_eq!(out, "SELECT * FROM orders");
    }

    #[test]
    fn test_repr_conversion_quotes_value() {
        let t = Template::parse("SELECT * FROM t WHERE name = {name!r}").unwrap();
        let out = t.render(&values(&[("name", "O'Brien")])).unwrap();
        assert_eq!(out, "SELECT * FROM t WHERE name = 'O''Brien'");
    }

    #[test]
    fn test_str_conversion_and_empty_spec() {
        let t = Template::parse("{a!s}{b:}").unwrap();
        assert_eq!(t.render(&values(&[("a", "x"), ("b", "y")])).unwrap(), "xy");
    }

    #[test]
    fn test_resolve_only_referenced_keys() {
        let t = Template::parse("SELECT {x}").unwrap();
        let pool: HashMap<String, String> = [("x", "1"), ("y", "2")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let refs = t.resolve(&pool).unwrap();
        assert_eq!(refs, values(&[("x", "1")]));
    }

    #[test]
    fn test_resolve_missing() {
        let t = Template::parse("SELECT {b}, {a}").unwrap();
        match t.resolve(&HashMap::new()) {
            Err(Error::MissingKeys(keys)) => assert_eq!(keys, vec!["a", "b"]),
            other => panic!("expected MissingKeys, got {:?}", other),
        }
    }

    #[test]
    fn test_positional_rejected() {
        assert!(matches!(Template::parse("SELECT {}"), Err(Error::Template { offset: 7, .. })));
        assert!(matches!(Template::parse("SELECT {0}"), Err(Error::Template { .. })));
    }

    #[test]
    fn test_unbalanced_braces_rejected() {
        assert!(matches!(Template::parse("SELECT {a"), Err(Error::Template { .. })));
        assert!(matches!(Template::parse("SELECT a}"), Err(Error::Template { offset: 8, .. })));
        assert!(matches!(Template::parse("{a{b}}"), Err(Error::Template { .. })));
    }

    #[test]
    fn test_unsupported_fields_rejected() {
        assert!(Template::parse("{a.b}").is_err());
        assert!(Template::parse("{a[0]}").is_err());
        assert!(Template::parse("{a:>10}").is_err());
        assert!(Template::parse("{a!x}").is_err());
    }
}
