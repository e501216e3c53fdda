//! Support for creating Atom feeds from a list of documents.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;

use atom_syndication::{Entry, Error as AtomError, Feed, Link, Person};
use chrono::{FixedOffset, NaiveDateTime, NaiveTime, TimeZone, Utc};
use url::Url;

use crate::config::Author;
use crate::content::Document;

/// Bundled configuration for creating a feed.
pub struct FeedConfig {
    pub title: String,
    pub id: String,
    pub author: Option<Author>,
    pub home_page: Url,
}

/// Creates a feed from some configuration ([`FeedConfig`]) and a list of
/// documents paired with their public URLs, and writes the result to a
/// [`std::io::Write`]. The documents are expected in reverse-chronological
/// order; entries are emitted in the order given. This function takes
/// ownership of the provided [`FeedConfig`].
pub fn write_feed<W: Write>(
    config: FeedConfig,
    documents: &[(&Document, Url)],
    w: W,
) -> Result<()> {
    feed(config, documents).write_to(w)?;
    Ok(())
}

fn feed(config: FeedConfig, documents: &[(&Document, Url)]) -> Feed {
    Feed {
        entries: feed_entries(&config, documents),
        title: config.title,
        id: config.id,
        updated: FixedOffset::east(0).from_utc_datetime(&Utc::now().naive_utc()),
        authors: author_to_people(config.author),
        categories: Vec::new(),
        contributors: Vec::new(),
        generator: None,
        icon: None,
        logo: None,
        rights: None,
        subtitle: None,
        extensions: HashMap::new(),
        namespaces: HashMap::new(),
        links: vec![Link {
            href: config.home_page.to_string(),
            rel: "alternate".to_string(),
            title: None,
            hreflang: None,
            mime_type: None,
            length: None,
        }],
    }
}

fn feed_entries(config: &FeedConfig, documents: &[(&Document, Url)]) -> Vec<Entry> {
    let mut entries: Vec<Entry> = Vec::with_capacity(documents.len());

    for (document, url) in documents {
        let (summary, _) = document.summary();

        // Documents only carry a date; pin the timestamp to midnight UTC so
        // rebuilds produce identical entries.
        let naive_time = NaiveTime::from_hms(0, 0, 0);
        let naive_date_time = NaiveDateTime::new(document.date, naive_time);
        let date = FixedOffset::east(0).from_utc_datetime(&naive_date_time);

        entries.push(Entry {
            id: url.to_string(),
            title: document.title.clone(),
            updated: date,
            authors: author_to_people(config.author.clone()),
            links: vec![Link {
                href: url.to_string(),
                rel: "alternate".to_owned(),
                title: None,
                mime_type: None,
                hreflang: None,
                length: None,
            }],
            rights: None,
            summary: Some(summary.to_owned()),
            categories: Vec::new(),
            contributors: Vec::new(),
            published: Some(date),
            source: None,
            content: None,
            extensions: HashMap::new(),
        })
    }
    entries
}

fn author_to_people(author: Option<Author>) -> Vec<Person> {
    match author {
        Some(author) => vec![Person {
            name: author.name,
            email: author.email,
            uri: None,
        }],
        None => Vec::new(),
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a problem creating a feed.
#[derive(Debug)]
pub enum Error {
    /// Returned when there is a generic I/O error.
    Io(std::io::Error),

    /// Returned when there is an Atom-related error.
    Atom(AtomError),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::Atom(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Atom(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    /// Converts [`std::io::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator in fallible feed operations.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<AtomError> for Error {
    /// Converts [`AtomError`]s into [`Error`]. This allows us to use the `?`
    /// operator in fallible feed operations.
    fn from(err: AtomError) -> Error {
        Error::Atom(err)
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_write_feed() -> Result<()> {
        let document = Document {
            id: "hello-world".to_owned(),
            title: "Hello, world!".to_owned(),
            date: NaiveDate::parse_from_str("2021-04-16", "%Y-%m-%d").unwrap(),
            slug: "hello-world".to_owned(),
            tags: BTreeSet::new(),
            body: "<p>Intro.</p><!-- more --><p>Rest.</p>".to_owned(),
        };
        let url = Url::parse("https://example.org/blog/2021/hello-world.html").unwrap();

        let mut out = Vec::new();
        write_feed(
            FeedConfig {
                title: "array.blue".to_owned(),
                id: "https://example.org/".to_owned(),
                author: Some(Author {
                    name: "author".to_owned(),
                    email: None,
                }),
                home_page: Url::parse("https://example.org/").unwrap(),
            },
            &[(&document, url)],
            &mut out,
        )?;

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Hello, world!"));
        assert!(out.contains("https://example.org/blog/2021/hello-world.html"));
        assert!(out.contains("2021-04-16T00:00:00"));
        assert!(out.contains("Intro."));
        assert!(!out.contains("Rest."));
        Ok(())
    }
}
