//! Defines the [`Document`] type and the [`ContentStore`], which discovers
//! source files under a content directory and parses them into memory. A
//! source file is YAML front-matter between `---` fences followed by a
//! markdown body:
//!
//! ```md
//! ---
//! title: Hello, world!
//! date: 2021-04-16
//! tags: [greet]
//! ---
//! # Hello
//!
//! World
//! ```
//!
//! The body is rendered to HTML at load time; everything downstream of the
//! store works with finished HTML. A malformed file is recorded as a
//! [`LoadFailure`] and skipped rather than aborting the whole load, so one
//! bad post doesn't take down the build.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use pulldown_cmark::{html, Options, Parser};
use serde::Deserialize;

/// One source content unit, fully parsed. Immutable after creation; the
/// store builds a fresh set every load and nothing persists across builds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    /// The source path relative to the content directory, minus the
    /// extension (e.g., the document at `{content_dir}/foo/bar.md` has id
    /// `foo/bar`). Uniquely identifies one document for the lifetime of a
    /// build.
    pub id: String,

    /// The title from front-matter, verbatim.
    pub title: String,

    /// The date from front-matter (`%Y-%m-%d`).
    pub date: NaiveDate,

    /// The URL-safe form of the title, or the front-matter `slug` override.
    pub slug: String,

    /// Slugified tag names. A set, so a document appears at most once per
    /// tag no matter how the front-matter is written.
    pub tags: BTreeSet<String>,

    /// The body rendered to HTML.
    pub body: String,
}

impl Document {
    /// Parses a single [`Document`] from its `id` and raw file contents.
    pub fn from_str(id: &str, input: &str) -> Result<Document> {
        fn frontmatter_indices(input: &str) -> Result<(usize, usize, usize)> {
            const FENCE: &str = "---";
            if !input.starts_with(FENCE) {
                return Err(Error::FrontmatterMissingStartFence);
            }
            match input[FENCE.len()..].find(FENCE) {
                None => Err(Error::FrontmatterMissingEndFence),
                Some(offset) => Ok((
                    FENCE.len(),                        // yaml_start
                    FENCE.len() + offset,               // yaml_stop
                    FENCE.len() + offset + FENCE.len(), // body_start
                )),
            }
        }

        let (yaml_start, yaml_stop, body_start) = frontmatter_indices(input)?;
        let frontmatter: Frontmatter = serde_yaml::from_str(&input[yaml_start..yaml_stop])?;
        let date = NaiveDate::parse_from_str(&frontmatter.date, "%Y-%m-%d")?;

        let slug = match frontmatter.slug {
            Some(slug) => slug::slugify(&slug),
            None => slug::slugify(&frontmatter.title),
        };

        let mut body = String::new();
        let mut options = Options::empty();
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_TASKLISTS);
        html::push_html(&mut body, Parser::new_ext(&input[body_start..], options));

        Ok(Document {
            id: id.to_owned(),
            title: frontmatter.title,
            date,
            slug,
            tags: frontmatter.tags.iter().map(|t| slug::slugify(t)).collect(),
            body,
        })
    }

    /// Returns the body up to the `<!-- more -->` fold marker, along with
    /// whether the marker was present. Index pages and the feed show the
    /// summary rather than the full body.
    pub fn summary(&self) -> (&str, bool) {
        const FOLD_TAG: &str = "<!-- more -->";
        match self.body.find(FOLD_TAG) {
            Some(i) => (&self.body[..i], true),
            None => (&self.body, false),
        }
    }
}

#[derive(Deserialize)]
struct Frontmatter {
    /// The title of the document. Required.
    title: String,

    /// The date of the document as `%Y-%m-%d`. Required.
    date: String,

    /// The tags associated with the document.
    #[serde(default)]
    tags: BTreeSet<String>,

    /// An optional slug override. When absent the slug derives from the
    /// title.
    #[serde(default)]
    slug: Option<String>,
}

/// A per-file load failure: the offending source file and what went wrong.
#[derive(Debug)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: Error,
}

impl fmt::Display for LoadFailure {
    /// Displays a [`LoadFailure`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "loading `{}`: {}", self.path.display(), self.error)
    }
}

/// The outcome of a [`ContentStore::load`]: the documents that parsed plus
/// the per-file failures that didn't abort the load.
pub struct Loaded {
    /// Parsed documents, sorted by date descending with ties broken by id
    /// ascending.
    pub documents: Vec<Document>,

    /// Files that failed to read or parse.
    pub failures: Vec<LoadFailure>,
}

/// Discovers and parses source files under a content directory.
pub struct ContentStore {
    /// The source file extension, including the leading dot (e.g., `.md`).
    pub extension: String,

    /// The number of worker threads for parsing. Values below 2 load
    /// single-threaded.
    pub threads: usize,
}

impl ContentStore {
    pub fn new(extension: &str, threads: usize) -> ContentStore {
        ContentStore {
            extension: extension.to_owned(),
            threads,
        }
    }

    /// Walks `dir` for files with the configured extension and parses each
    /// into a [`Document`]. Errors walking the directory are structural and
    /// abort the load; errors reading or parsing an individual file are
    /// recorded in [`Loaded::failures`] and that file is skipped. The
    /// returned documents are sorted deterministically regardless of
    /// discovery or completion order.
    pub fn load(&self, dir: &Path) -> Result<Loaded> {
        let entries = self.discover(dir)?;
        let mut loaded = if self.threads < 2 {
            self.load_singlethreaded(entries)
        } else {
            self.load_parallel(entries)
        };
        loaded
            .documents
            .sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
        loaded
            .failures
            .sort_by(|a, b| a.path.cmp(&b.path));
        Ok(loaded)
    }

    /// Collects `(id, path)` pairs for every source file under `dir`. The id
    /// is the path relative to `dir` minus the extension, with `/`
    /// separators.
    fn discover(&self, dir: &Path) -> Result<Vec<(String, PathBuf)>> {
        use walkdir::WalkDir;

        let mut entries = Vec::new();
        for result in WalkDir::new(dir) {
            let entry = result?;
            if !entry.file_type().is_file() {
                continue;
            }
            // strip_prefix can't fail since `dir` is the walk root
            let relative = entry.path().strip_prefix(dir).unwrap();
            let relative = relative
                .to_str()
                .ok_or_else(|| Error::InvalidFileName(entry.path().to_owned()))?
                .replace(std::path::MAIN_SEPARATOR, "/");
            if relative.ends_with(&self.extension) {
                let id = relative.trim_end_matches(&self.extension).to_owned();
                entries.push((id, entry.path().to_owned()));
            }
        }
        Ok(entries)
    }

    fn load_singlethreaded(&self, entries: Vec<(String, PathBuf)>) -> Loaded {
        let mut documents = Vec::new();
        let mut failures = Vec::new();
        for (id, path) in entries {
            match load_entry(&id, &path) {
                Ok(document) => documents.push(document),
                Err(error) => failures.push(LoadFailure { path, error }),
            }
        }
        Loaded {
            documents,
            failures,
        }
    }

    fn load_parallel(&self, entries: Vec<(String, PathBuf)>) -> Loaded {
        use crossbeam_channel::unbounded;
        use std::thread;

        let (tx, rx) = unbounded::<(String, PathBuf)>();
        let mut threads = Vec::with_capacity(self.threads);

        for _ in 0..threads.capacity() {
            let rx = rx.clone();
            threads.push(thread::spawn(move || {
                let mut documents = Vec::new();
                let mut failures = Vec::new();
                for (id, path) in rx {
                    match load_entry(&id, &path) {
                        Ok(document) => documents.push(document),
                        Err(error) => failures.push(LoadFailure { path, error }),
                    }
                }
                (documents, failures)
            }));
        }

        for entry in entries {
            // send can't fail while this side holds the receiver's peers
            let _ = tx.send(entry);
        }
        drop(tx);

        let mut documents = Vec::new();
        let mut failures = Vec::new();
        for thread in threads {
            let (docs, fails) = thread.join().unwrap();
            documents.extend(docs);
            failures.extend(fails);
        }
        Loaded {
            documents,
            failures,
        }
    }
}

fn load_entry(id: &str, path: &Path) -> Result<Document> {
    let mut contents = String::new();
    File::open(path)?.read_to_string(&mut contents)?;
    Document::from_str(id, &contents)
}

/// Represents the result of a document-load operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading a [`Document`].
#[derive(Debug)]
pub enum Error {
    /// Returned when a source file is missing its starting front-matter
    /// fence (`---`).
    FrontmatterMissingStartFence,

    /// Returned when a source file is missing its terminal front-matter
    /// fence (i.e., the starting fence was found but the ending one was
    /// missing).
    FrontmatterMissingEndFence,

    /// Returned when the front-matter isn't valid YAML or lacks a required
    /// field (`title`, `date`).
    DeserializeYaml(serde_yaml::Error),

    /// Returned when the front-matter date isn't `%Y-%m-%d`.
    DateFormat(chrono::ParseError),

    /// Returned when a source path isn't valid UTF-8.
    InvalidFileName(PathBuf),

    /// Returned for I/O errors walking the content directory.
    WalkDir(walkdir::Error),

    /// Returned for other I/O errors.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::FrontmatterMissingStartFence => {
                write!(f, "document must begin with `---`")
            }
            Error::FrontmatterMissingEndFence => {
                write!(f, "missing closing `---`")
            }
            Error::DeserializeYaml(err) => write!(f, "malformed front-matter: {}", err),
            Error::DateFormat(err) => write!(f, "malformed front-matter date: {}", err),
            Error::InvalidFileName(path) => {
                write!(f, "invalid file name: {:?}", path)
            }
            Error::WalkDir(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::FrontmatterMissingStartFence => None,
            Error::FrontmatterMissingEndFence => None,
            Error::DeserializeYaml(err) => Some(err),
            Error::DateFormat(err) => Some(err),
            Error::InvalidFileName(_) => None,
            Error::WalkDir(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator for front-matter deserialization.
    fn from(err: serde_yaml::Error) -> Error {
        Error::DeserializeYaml(err)
    }
}

impl From<chrono::ParseError> for Error {
    /// Converts a [`chrono::ParseError`] into an [`Error`]. It allows us to
    /// use the `?` operator when parsing front-matter dates.
    fn from(err: chrono::ParseError) -> Error {
        Error::DateFormat(err)
    }
}

impl From<walkdir::Error> for Error {
    /// Converts a [`walkdir::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator when walking the content directory.
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
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
    fn test_from_str() -> Result<()> {
        let document = Document::from_str(
            "hello-world",
            "---\ntitle: Hello, world!\ndate: 2021-04-16\ntags: [Greet, MacOS]\n---\nBody.",
        )?;
        assert_eq!("hello-world", document.id);
        assert_eq!("Hello, world!", document.title);
        assert_eq!(
            NaiveDate::parse_from_str("2021-04-16", "%Y-%m-%d").unwrap(),
            document.date,
        );
        assert_eq!("hello-world", document.slug);
        let tags: Vec<&str> = document.tags.iter().map(|t| t.as_str()).collect();
        assert_eq!(vec!["greet", "macos"], tags);
        assert!(document.body.contains("Body."));
        Ok(())
    }

    #[test]
    fn test_from_str_slug_override() -> Result<()> {
        let document = Document::from_str(
            "post",
            "---\ntitle: A Post\ndate: 2021-04-16\nslug: Something Else\n---\n",
        )?;
        assert_eq!("something-else", document.slug);
        Ok(())
    }

    #[test]
    fn test_from_str_missing_date() {
        let result = Document::from_str("post", "---\ntitle: No Date\n---\n");
        match result {
            Err(Error::DeserializeYaml(_)) => {}
            other => panic!("wanted DeserializeYaml error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_from_str_missing_start_fence() {
        match Document::from_str("post", "title: No Fence\n") {
            Err(Error::FrontmatterMissingStartFence) => {}
            other => panic!("wanted missing start fence, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_from_str_missing_end_fence() {
        match Document::from_str("post", "---\ntitle: No End\ndate: 2021-04-16\n") {
            Err(Error::FrontmatterMissingEndFence) => {}
            other => panic!("wanted missing end fence, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_summary_with_fold_marker() -> Result<()> {
        let document = Document::from_str(
            "post",
            "---\ntitle: Folded\ndate: 2021-04-16\n---\nIntro.\n\n<!-- more -->\n\nRest.",
        )?;
        let (summary, summarized) = document.summary();
        assert!(summarized);
        assert!(summary.contains("Intro."));
        assert!(!summary.contains("Rest."));
        Ok(())
    }

    #[test]
    fn test_summary_without_fold_marker() -> Result<()> {
        let document =
            Document::from_str("post", "---\ntitle: Whole\ndate: 2021-04-16\n---\nAll of it.")?;
        let (summary, summarized) = document.summary();
        assert!(!summarized);
        assert_eq!(document.body, summary);
        Ok(())
    }

    #[test]
    fn test_load_sorts_and_records_failures() -> Result<()> {
        let store = ContentStore::new(".md", 1);
        let loaded = store.load(Path::new("./testdata/posts/"))?;

        let ids: Vec<&str> = loaded.documents.iter().map(|d| d.id.as_str()).collect();
        // date descending, ties broken by id ascending
        assert_eq!(vec!["second-post", "hello-world", "nested/deep-post"], ids);

        assert_eq!(1, loaded.failures.len());
        assert!(loaded.failures[0].path.ends_with("no-date.md"));
        match loaded.failures[0].error {
            Error::DeserializeYaml(_) => {}
            ref other => panic!("wanted DeserializeYaml error, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_load_parallel_matches_singlethreaded() -> Result<()> {
        let single = ContentStore::new(".md", 1).load(Path::new("./testdata/posts/"))?;
        let parallel = ContentStore::new(".md", 4).load(Path::new("./testdata/posts/"))?;
        assert_eq!(single.documents, parallel.documents);
        assert_eq!(single.failures.len(), parallel.failures.len());
        Ok(())
    }
}
