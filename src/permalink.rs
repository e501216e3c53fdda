//! Expands permalink templates (e.g., `blog/{year}/{title}.html`) into
//! concrete output paths. The same substitution machinery also powers page
//! links (`page/{num}`) and tag links (`tags/{tag}.html`) via [`expand`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::Datelike;

use crate::content::Document;

/// Resolves a permalink `template` against a [`Document`]. Supported tokens
/// are `{year}`, `{month}`, and `{day}` (zero-padded from the document's
/// date) as well as `{title}` and `{slug}` (both of which substitute the
/// document's slug, since a raw title isn't URL-safe). Resolution is a pure
/// function of its inputs, so re-running a build always yields the same
/// paths.
pub fn resolve(template: &str, document: &Document) -> Result<String> {
    let mut fields = BTreeMap::new();
    fields.insert("year", format!("{:04}", document.date.year()));
    fields.insert("month", format!("{:02}", document.date.month()));
    fields.insert("day", format!("{:02}", document.date.day()));
    fields.insert("title", document.slug.clone());
    fields.insert("slug", document.slug.clone());
    expand(template, &fields)
}

/// Expands a page-link `template` by substituting `{num}` with a 1-based
/// page number.
pub fn expand_num(template: &str, num: usize) -> Result<String> {
    let mut fields = BTreeMap::new();
    fields.insert("num", num.to_string());
    expand(template, &fields)
}

/// Expands a tag-link `template` by substituting `{tag}` with a tag name.
/// The tag is expected to already be slugified.
pub fn expand_tag(template: &str, tag: &str) -> Result<String> {
    let mut fields = BTreeMap::new();
    fields.insert("tag", tag.to_owned());
    expand(template, &fields)
}

/// Substitutes every `{field}` token in `template` with the corresponding
/// entry in `fields`. Tokens that don't appear in `fields` fail with
/// [`Error::UnresolvedPlaceholder`]; a `{` with no matching `}` fails with
/// [`Error::UnclosedPlaceholder`]. Text outside of tokens passes through
/// verbatim.
pub fn expand(template: &str, fields: &BTreeMap<&str, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            None => return Err(Error::UnclosedPlaceholder(rest[start..].to_owned())),
            Some(stop) => {
                let token = &after[..stop];
                match fields.get(token) {
                    None => return Err(Error::UnresolvedPlaceholder(token.to_owned())),
                    Some(value) => out.push_str(value),
                }
                rest = &after[stop + 1..];
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// The result of a fallible template-expansion operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error expanding a permalink template.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Returned when a template references a token with no corresponding
    /// field. Carries the token name.
    UnresolvedPlaceholder(String),

    /// Returned when a `{` has no matching `}`. Carries the remainder of the
    /// template starting at the offending `{`.
    UnclosedPlaceholder(String),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnresolvedPlaceholder(token) => {
                write!(f, "unresolved placeholder `{{{}}}`", token)
            }
            Error::UnclosedPlaceholder(rest) => {
                write!(f, "unclosed placeholder at `{}`", rest)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use chrono::NaiveDate;

    use super::*;

    fn document(title: &str, date: &str) -> Document {
        Document {
            id: slug::slugify(title),
            title: title.to_owned(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            slug: slug::slugify(title),
            tags: BTreeSet::new(),
            body: String::new(),
        }
    }

    #[test]
    fn test_resolve_blog_permalink() -> Result<()> {
        let a = document("A", "2023-01-01");
        let b = document("B", "2023-06-01");
        assert_eq!("blog/2023/a.html", resolve("blog/{year}/{title}.html", &a)?);
        assert_eq!("blog/2023/b.html", resolve("blog/{year}/{title}.html", &b)?);
        Ok(())
    }

    #[test]
    fn test_resolve_is_idempotent() -> Result<()> {
        let doc = document("Hello, world!", "2021-04-16");
        let template = "blog/{year}/{month}/{day}/{slug}.html";
        let first = resolve(template, &doc)?;
        assert_eq!("blog/2021/04/16/hello-world.html", first);
        assert_eq!(first, resolve(template, &doc)?);
        Ok(())
    }

    #[test]
    fn test_resolve_zero_pads_date_fields() -> Result<()> {
        let doc = document("Pad", "2023-02-03");
        assert_eq!("2023/02/03", resolve("{year}/{month}/{day}", &doc)?);
        Ok(())
    }

    #[test]
    fn test_resolve_unknown_token() {
        let doc = document("A", "2023-01-01");
        assert_eq!(
            Err(Error::UnresolvedPlaceholder("category".to_owned())),
            resolve("blog/{category}/{title}.html", &doc),
        );
    }

    #[test]
    fn test_expand_unclosed_placeholder() {
        let fields = BTreeMap::new();
        assert_eq!(
            Err(Error::UnclosedPlaceholder("{num".to_owned())),
            expand("page/{num", &fields),
        );
    }

    #[test]
    fn test_expand_num() -> Result<()> {
        assert_eq!("page/2", expand_num("page/{num}", 2)?);
        Ok(())
    }

    #[test]
    fn test_expand_tag() -> Result<()> {
        assert_eq!("tags/rust.html", expand_tag("tags/{tag}.html", "rust")?);
        Ok(())
    }

    #[test]
    fn test_expand_without_tokens_passes_through() -> Result<()> {
        let fields = BTreeMap::new();
        assert_eq!("index.html", expand("index.html", &fields)?);
        Ok(())
    }
}
