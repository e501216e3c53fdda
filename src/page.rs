//! Splits an ordered document sequence into fixed-size pages with
//! prev/next navigation links. The caller is responsible for sorting the
//! documents (the orchestrator sorts by date descending before paginating);
//! this module only groups and links them.

use std::fmt;

use crate::content::Document;
use crate::permalink;

/// One pagination unit: an ordered subset of documents plus its output path
/// and navigation links. Derived, never stored; regenerated each build.
pub struct Page<'a> {
    /// The 1-based page number.
    pub number: usize,

    /// The documents on this page, in input order.
    pub documents: Vec<&'a Document>,

    /// The output path for this page.
    pub path: String,

    /// The path of the previous page, if any. Page 1 has none.
    pub prev_path: Option<String>,

    /// The path of the next page, if any. The last page has none.
    pub next_path: Option<String>,
}

impl Page<'_> {
    pub fn has_prev(&self) -> bool {
        self.prev_path.is_some()
    }

    pub fn has_next(&self) -> bool {
        self.next_path.is_some()
    }
}

/// Splits `documents` into consecutive groups of `page_size`. The last page
/// may be smaller but is never empty; empty input yields no pages. Page 1
/// lives at `first_path`; subsequent pages live at `link_template` with
/// `{num}` substituted by the page number. Navigation links are derived from
/// the same two inputs, so the whole result is a pure function of its
/// arguments.
pub fn paginate<'a>(
    documents: &[&'a Document],
    page_size: usize,
    first_path: &str,
    link_template: &str,
) -> Result<Vec<Page<'a>>> {
    if page_size == 0 {
        return Err(Error::ZeroPageSize);
    }

    let total_pages = match documents.len() % page_size {
        0 => documents.len() / page_size,
        _ => documents.len() / page_size + 1,
    };

    let page_path = |number: usize| -> Result<String> {
        match number {
            1 => Ok(first_path.to_owned()),
            _ => Ok(permalink::expand_num(link_template, number)?),
        }
    };

    let mut pages = Vec::with_capacity(total_pages);
    for (i, chunk) in documents.chunks(page_size).enumerate() {
        let number = i + 1;
        pages.push(Page {
            number,
            documents: chunk.to_vec(),
            path: page_path(number)?,
            prev_path: match number {
                1 => None,
                _ => Some(page_path(number - 1)?),
            },
            next_path: match number < total_pages {
                false => None,
                true => Some(page_path(number + 1)?),
            },
        });
    }
    Ok(pages)
}

/// The result of a fallible pagination operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error splitting documents into pages.
#[derive(Debug)]
pub enum Error {
    /// Returned when the configured page size is zero. A zero page size is a
    /// configuration error, so it aborts the build rather than being
    /// recorded per-document.
    ZeroPageSize,

    /// Returned when the page-link template fails to expand.
    Permalink(permalink::Error),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ZeroPageSize => write!(f, "page size must be greater than zero"),
            Error::Permalink(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ZeroPageSize => None,
            Error::Permalink(err) => Some(err),
        }
    }
}

impl From<permalink::Error> for Error {
    /// Converts a [`permalink::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator when expanding page links.
    fn from(err: permalink::Error) -> Error {
        Error::Permalink(err)
    }
}
