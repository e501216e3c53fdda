//! Writes a search-engine sitemap listing every output path produced by a
//! build. Every URL gets the same default priority and change frequency;
//! per-page overrides aren't supported.

use std::io::Write;

use url::Url;

const DEFAULT_PRIORITY: &str = "0.5";
const DEFAULT_CHANGE_FREQUENCY: &str = "monthly";

/// Writes a sitemap for `paths` (site-relative output paths) rooted at
/// `site_root` into `w`. Paths are emitted in the order given; the caller
/// is responsible for passing a deterministically ordered list.
pub fn write_sitemap<W: Write>(
    site_root: &Url,
    paths: &[String],
    mut w: W,
) -> Result<(), Error> {
    writeln!(w, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        w,
        r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#
    )?;
    for path in paths {
        let url = site_root.join(path)?;
        writeln!(w, "  <url>")?;
        writeln!(w, "    <loc>{}</loc>", escape(url.as_str()))?;
        writeln!(
            w,
            "    <changefreq>{}</changefreq>",
            DEFAULT_CHANGE_FREQUENCY
        )?;
        writeln!(w, "    <priority>{}</priority>", DEFAULT_PRIORITY)?;
        writeln!(w, "  </url>")?;
    }
    writeln!(w, "</urlset>")?;
    Ok(())
}

// The characters that must not appear raw in XML text content.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Represents an error writing the sitemap.
#[derive(Debug)]
pub enum Error {
    /// Returned when a path doesn't join onto the site root.
    UrlParse(url::ParseError),

    /// Returned for I/O errors writing the sitemap.
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::UrlParse(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::UrlParse(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<url::ParseError> for Error {
    /// Converts a [`url::ParseError`] into an [`Error`]. It allows us to use
    /// the `?` operator when joining output paths onto the site root.
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}

impl From<std::io::Error> for Error {
    /// Converts a [`std::io::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for fallible I/O functions.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_write_sitemap() -> Result<(), Error> {
        let site_root = Url::parse("https://example.org/").unwrap();
        let paths = vec![
            "blog/2023/a.html".to_owned(),
            "index.html".to_owned(),
        ];
        let mut out = Vec::new();
        write_sitemap(&site_root, &paths, &mut out)?;
        let out = String::from_utf8(out).unwrap();

        assert!(out.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(out.contains("<loc>https://example.org/blog/2023/a.html</loc>"));
        assert!(out.contains("<loc>https://example.org/index.html</loc>"));
        assert_eq!(2, out.matches("<changefreq>monthly</changefreq>").count());
        assert_eq!(2, out.matches("<priority>0.5</priority>").count());
        Ok(())
    }

    #[test]
    fn test_escape() {
        assert_eq!("a&amp;b&lt;c&gt;", escape("a&b<c>"));
    }
}
