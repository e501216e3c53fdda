//! Exports the [`Builder`], which stitches together the high-level steps of
//! building the output site: loading documents ([`crate::content`]),
//! resolving their permalinks ([`crate::permalink`]), indexing them by tag
//! ([`crate::tag`]), paginating the main and tag collections
//! ([`crate::page`]), rendering every unit through the [`Render`]
//! collaborator, and writing the results plus the Atom feed and sitemap to
//! the output directory.
//!
//! A malformed document is recorded and skipped rather than aborting the
//! build; only structural problems (bad configuration, directory-listing
//! I/O, output-path collisions, feed/sitemap failures) are fatal.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::PathBuf;

use log::{info, warn};
use url::Url;

use crate::config::{BuildMode, Config};
use crate::content::{self, ContentStore, Document};
use crate::feed::{self, FeedConfig};
use crate::minify::{HtmlMinifier, PostProcess};
use crate::page::{self, Page};
use crate::permalink;
use crate::render::{self, Render, RouteTable, TemplateSet, Unit};
use crate::sitemap;
use crate::tag;

const DOCUMENT_LAYOUT: &str = "layout";
const INDEX_LAYOUT: &str = "index";
const TAG_LAYOUT: &str = "tag";
const INDEX_FIRST_PATH: &str = "index.html";
const FEED_FILE: &str = "feed.xml";
const SITEMAP_FILE: &str = "sitemap.xml";
const HTML_EXTENSION: &str = ".html";

/// The stages a build moves through. A build either runs to [`Stage::Done`]
/// (possibly with per-document failures recorded along the way) or halts in
/// [`Stage::Failed`] on the first structural error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Loading,
    Indexing,
    Paginating,
    Rendering,
    Done,
    Failed,
}

/// What one build produced.
pub struct BuildResult {
    /// The number of documents rendered and written.
    pub success_count: usize,

    /// Every per-unit failure recorded during the build. These never abort
    /// the build; they're surfaced here for the caller to report.
    pub failures: Vec<Failure>,

    /// The public paths of everything written, in output order. The sitemap
    /// lists exactly these.
    pub output_paths: Vec<String>,
}

/// A recorded per-unit failure: which unit (a document id, source file, or
/// page path) and what went wrong.
#[derive(Debug)]
pub struct Failure {
    pub unit: String,
    pub error: UnitError,
}

impl fmt::Display for Failure {
    /// Displays a [`Failure`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.unit, self.error)
    }
}

/// Represents an error that was recorded against a single unit rather than
/// aborting the build.
#[derive(Debug)]
pub enum UnitError {
    /// The unit's source file failed to read or parse.
    Load(content::Error),

    /// The unit's permalink referenced a field it doesn't have.
    Permalink(permalink::Error),

    /// The unit failed to render.
    Render(render::Error),

    /// The unit's output file failed to write.
    Io(std::io::Error),
}

impl fmt::Display for UnitError {
    /// Displays a [`UnitError`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnitError::Load(err) => err.fmt(f),
            UnitError::Permalink(err) => err.fmt(f),
            UnitError::Render(err) => err.fmt(f),
            UnitError::Io(err) => err.fmt(f),
        }
    }
}

/// Coordinates one build invocation. Owns all derived structures (routes,
/// tag index, page lists) for the duration of the build; nothing survives
/// across builds.
pub struct Builder<'a, R: Render> {
    config: &'a Config,
    renderer: &'a R,
    post_processors: Vec<Box<dyn PostProcess>>,
    stage: Stage,
}

impl<'a, R: Render> Builder<'a, R> {
    pub fn new(config: &'a Config, renderer: &'a R) -> Builder<'a, R> {
        Builder {
            config,
            renderer,
            post_processors: Vec::new(),
            stage: Stage::Idle,
        }
    }

    /// Adds an output post-processor. Processors run in registration order
    /// over every rendered unit, but only in production mode.
    pub fn with_post_processor(mut self, processor: Box<dyn PostProcess>) -> Builder<'a, R> {
        self.post_processors.push(processor);
        self
    }

    /// The stage the builder is currently in (or ended in).
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Runs the build. Per-unit failures are collected into the returned
    /// [`BuildResult`]; structural errors abort immediately and leave the
    /// builder in [`Stage::Failed`].
    pub fn build(&mut self) -> Result<BuildResult> {
        match self.run() {
            Ok(result) => {
                self.transition(Stage::Done);
                info!(
                    "build done: {} documents, {} failures",
                    result.success_count,
                    result.failures.len()
                );
                Ok(result)
            }
            Err(err) => {
                self.transition(Stage::Failed);
                Err(err)
            }
        }
    }

    fn transition(&mut self, stage: Stage) {
        info!("{:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    fn run(&mut self) -> Result<BuildResult> {
        let config = self.config;
        config.validate()?;
        std::fs::create_dir_all(&config.output_directory)?;

        self.transition(Stage::Loading);
        let store = ContentStore::new(&config.default_extension, config.threads);
        let loaded = store.load(&config.content_directory)?;
        let total_found = loaded.documents.len() + loaded.failures.len();

        let mut failures: Vec<Failure> = loaded
            .failures
            .into_iter()
            .map(|failure| Failure {
                unit: failure.path.display().to_string(),
                error: UnitError::Load(failure.error),
            })
            .collect();

        // Resolve a permalink for every document. A document whose permalink
        // won't resolve is recorded and dropped from the rest of the build;
        // two documents resolving to the same path is a configuration
        // problem and fatal.
        let documents = loaded.documents;
        let mut routed: Vec<(&Document, String)> = Vec::new();
        let mut claimed: HashMap<String, &str> = HashMap::new();
        for document in &documents {
            match permalink::resolve(&config.permalink, document) {
                Ok(path) => {
                    if let Some(first) = claimed.insert(path.clone(), &document.id) {
                        return Err(Error::PathCollision {
                            path,
                            first: first.to_owned(),
                            second: document.id.clone(),
                        });
                    }
                    routed.push((document, path));
                }
                Err(err) => {
                    warn!("resolving permalink for `{}`: {}", document.id, err);
                    failures.push(Failure {
                        unit: document.id.clone(),
                        error: UnitError::Permalink(err),
                    });
                }
            }
        }

        let mut routes = RouteTable::new();
        for (document, path) in &routed {
            routes.insert(
                &document.id,
                &public_path(path, config.directory_indexes),
            );
        }

        self.transition(Stage::Indexing);
        let doc_refs: Vec<&Document> = routed.iter().map(|(document, _)| *document).collect();
        let tag_index = tag::index(&doc_refs);

        self.transition(Stage::Paginating);
        let page_link = normalize_page_link(&config.page_link);
        let index_pages = page::paginate(&doc_refs, config.page_size, INDEX_FIRST_PATH, &page_link)?;

        let mut tag_pages: Vec<(&str, Vec<Page>)> = Vec::new();
        for (tag, tagged) in tag_index.iter() {
            let first_path = permalink::expand_tag(&config.tag_link, tag)?;
            let stem = first_path.trim_end_matches(HTML_EXTENSION);
            let link_template = format!("{}/{}", stem, page_link);
            tag_pages.push((
                tag,
                page::paginate(tagged, config.page_size, &first_path, &link_template)?,
            ));
        }

        self.transition(Stage::Rendering);
        let mut output_paths = Vec::new();
        let mut success_count = 0;

        let mut written: Vec<(&Document, &str)> = Vec::with_capacity(routed.len());
        for &(document, ref path) in &routed {
            match self.render_unit(&Unit::Document(document), path, DOCUMENT_LAYOUT, &routes) {
                Ok(()) => {
                    success_count += 1;
                    output_paths.push(public_path(path, config.directory_indexes));
                    written.push((document, path));
                }
                Err(error) => {
                    warn!("rendering `{}`: {}", document.id, error);
                    failures.push(Failure {
                        unit: document.id.clone(),
                        error,
                    });
                }
            }
        }

        for page in &index_pages {
            match self.render_unit(&Unit::Index(page), &page.path, INDEX_LAYOUT, &routes) {
                Ok(()) => output_paths.push(public_path(&page.path, config.directory_indexes)),
                Err(error) => {
                    warn!("rendering index page `{}`: {}", page.path, error);
                    failures.push(Failure {
                        unit: page.path.clone(),
                        error,
                    });
                }
            }
        }

        for &(name, ref pages) in &tag_pages {
            for page in pages {
                match self.render_unit(&Unit::Tag { name, page }, &page.path, TAG_LAYOUT, &routes) {
                    Ok(()) => output_paths.push(public_path(&page.path, config.directory_indexes)),
                    Err(error) => {
                        warn!("rendering tag page `{}`: {}", page.path, error);
                        failures.push(Failure {
                            unit: page.path.clone(),
                            error,
                        });
                    }
                }
            }
        }

        if success_count == 0 && total_found > 0 {
            return Err(Error::NothingBuilt {
                attempted: total_found,
                failures,
            });
        }

        // The feed lists documents newest-first (`written` preserves the
        // store's ordering) and only advertises pages that actually exist.
        let mut feed_documents: Vec<(&Document, Url)> = Vec::with_capacity(written.len());
        for &(document, path) in &written {
            let url = config
                .site_root
                .join(&public_path(path, config.directory_indexes))?;
            feed_documents.push((document, url));
        }
        feed::write_feed(
            FeedConfig {
                title: config.title.clone(),
                id: config.site_root.to_string(),
                author: config.author.clone(),
                home_page: config.site_root.clone(),
            },
            &feed_documents,
            File::create(config.output_directory.join(FEED_FILE))?,
        )?;

        sitemap::write_sitemap(
            &config.site_root,
            &output_paths,
            File::create(config.output_directory.join(SITEMAP_FILE))?,
        )?;

        Ok(BuildResult {
            success_count,
            failures,
            output_paths,
        })
    }

    /// Renders one unit, runs production post-processing, and writes the
    /// result to the output tree. Errors here are per-unit; the caller
    /// records them and moves on.
    fn render_unit(
        &self,
        unit: &Unit,
        path: &str,
        layout: &str,
        routes: &RouteTable,
    ) -> std::result::Result<(), UnitError> {
        let mut rendered = self
            .renderer
            .render(unit, &public_path(path, self.config.directory_indexes), layout, routes)
            .map_err(UnitError::Render)?;

        if self.config.mode == BuildMode::Production {
            for processor in &self.post_processors {
                rendered = processor.process(rendered);
            }
        }

        let file_path = self
            .config
            .output_directory
            .join(output_file_path(path, self.config.directory_indexes));
        if let Some(dir) = file_path.parent() {
            std::fs::create_dir_all(dir).map_err(UnitError::Io)?;
        }
        std::fs::write(&file_path, &rendered).map_err(UnitError::Io)?;
        Ok(())
    }
}

/// Builds the site from a [`Config`], using the theme's [`TemplateSet`] as
/// the renderer and the stock HTML minifier in production mode.
pub fn build_site(config: &Config) -> Result<BuildResult> {
    let templates = TemplateSet::load(&config.theme_directory, &config.site_root, &config.title)?;
    let mut builder = Builder::new(config, &templates)
        .with_post_processor(Box::new(HtmlMinifier::default()));
    builder.build()
}

// Page links like `page/{num}` have no extension; give the expanded path
// one so it maps onto an output file.
fn normalize_page_link(page_link: &str) -> String {
    if page_link.ends_with(HTML_EXTENSION) {
        page_link.to_owned()
    } else {
        format!("{}{}", page_link, HTML_EXTENSION)
    }
}

/// Maps a resolved path to the file written on disk. With directory indexes
/// enabled, `blog/a.html` becomes `blog/a/index.html` so the page is
/// reachable at the extensionless URL `blog/a/`.
fn output_file_path(path: &str, directory_indexes: bool) -> PathBuf {
    if !directory_indexes || path.ends_with("/index.html") || path == "index.html" {
        return PathBuf::from(path);
    }
    match path.strip_suffix(HTML_EXTENSION) {
        Some(stem) => PathBuf::from(format!("{}/index.html", stem)),
        None => PathBuf::from(path),
    }
}

/// Maps a resolved path to the public URL path advertised in links, the
/// feed, and the sitemap.
fn public_path(path: &str, directory_indexes: bool) -> String {
    if !directory_indexes {
        return path.to_owned();
    }
    if path == "index.html" {
        return String::new();
    }
    match path.strip_suffix("/index.html") {
        Some(stem) => format!("{}/", stem),
        None => match path.strip_suffix(HTML_EXTENSION) {
            Some(stem) => format!("{}/", stem),
            None => path.to_owned(),
        },
    }
}

/// The result of a fallible build operation.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. All of these are structural; they
/// abort the build.
#[derive(Debug)]
pub enum Error {
    /// Returned for invalid or unloadable configuration.
    Config(crate::config::Error),

    /// Returned when the content directory itself can't be listed.
    Load(content::Error),

    /// Returned when two documents resolve to the same output path. The
    /// build refuses to silently overwrite one with the other.
    PathCollision {
        path: String,
        first: String,
        second: String,
    },

    /// Returned when a tag- or page-link template fails to expand.
    Permalink(permalink::Error),

    /// Returned for pagination errors.
    Paginate(page::Error),

    /// Returned when the theme's templates fail to load.
    Template(render::Error),

    /// Returned for errors writing the feed.
    Feed(feed::Error),

    /// Returned for errors writing the sitemap.
    Sitemap(sitemap::Error),

    /// Returned when an output path doesn't join onto the site root.
    UrlParse(url::ParseError),

    /// Returned when documents were found but none of them built.
    NothingBuilt {
        attempted: usize,
        failures: Vec<Failure>,
    },

    /// Returned for other I/O errors.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Config(err) => err.fmt(f),
            Error::Load(err) => err.fmt(f),
            Error::PathCollision {
                path,
                first,
                second,
            } => write!(
                f,
                "documents `{}` and `{}` both resolve to output path `{}`",
                first, second, path
            ),
            Error::Permalink(err) => err.fmt(f),
            Error::Paginate(err) => err.fmt(f),
            Error::Template(err) => err.fmt(f),
            Error::Feed(err) => err.fmt(f),
            Error::Sitemap(err) => err.fmt(f),
            Error::UrlParse(err) => err.fmt(f),
            Error::NothingBuilt { attempted, .. } => {
                write!(f, "all {} documents failed to build", attempted)
            }
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(err) => Some(err),
            Error::Load(err) => Some(err),
            Error::PathCollision { .. } => None,
            Error::Permalink(err) => Some(err),
            Error::Paginate(err) => Some(err),
            Error::Template(err) => Some(err),
            Error::Feed(err) => Some(err),
            Error::Sitemap(err) => Some(err),
            Error::UrlParse(err) => Some(err),
            Error::NothingBuilt { .. } => None,
            Error::Io(err) => Some(err),
        }
    }
}

impl From<crate::config::Error> for Error {
    /// Converts [`crate::config::Error`]s into [`Error`]. This allows us to
    /// use the `?` operator.
    fn from(err: crate::config::Error) -> Error {
        Error::Config(err)
    }
}

impl From<content::Error> for Error {
    /// Converts [`content::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: content::Error) -> Error {
        Error::Load(err)
    }
}

impl From<permalink::Error> for Error {
    /// Converts [`permalink::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: permalink::Error) -> Error {
        Error::Permalink(err)
    }
}

impl From<page::Error> for Error {
    /// Converts [`page::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: page::Error) -> Error {
        Error::Paginate(err)
    }
}

impl From<render::Error> for Error {
    /// Converts [`render::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: render::Error) -> Error {
        Error::Template(err)
    }
}

impl From<feed::Error> for Error {
    /// Converts [`feed::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: feed::Error) -> Error {
        Error::Feed(err)
    }
}

impl From<sitemap::Error> for Error {
    /// Converts [`sitemap::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: sitemap::Error) -> Error {
        Error::Sitemap(err)
    }
}

impl From<url::ParseError> for Error {
    /// Converts [`url::ParseError`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}

impl From<std::io::Error> for Error {
    /// Converts [`std::io::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use super::*;
    use crate::config::{BuildMode, Config};

    fn test_config(output: &Path) -> Config {
        Config::from_project_file(
            Path::new("./testdata/site.yaml"),
            output,
            BuildMode::Development,
            Some(1),
        )
        .unwrap()
    }

    fn fresh_output_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_build_site() -> Result<()> {
        let output = fresh_output_dir("stapol-test-build");
        let config = test_config(&output);
        let result = build_site(&config)?;

        // three valid posts; no-date.md is recorded, not fatal
        assert_eq!(3, result.success_count);
        assert_eq!(1, result.failures.len());
        assert!(result.failures[0].unit.ends_with("no-date.md"));

        assert!(output.join("blog/2021/hello-world.html").is_file());
        assert!(output.join("blog/2021/second-post.html").is_file());
        assert!(output.join("blog/2021/deep-post.html").is_file());
        assert!(output.join("index.html").is_file());
        assert!(output.join("tags/rust.html").is_file());
        assert!(output.join("tags/greet.html").is_file());
        assert!(output.join(FEED_FILE).is_file());
        assert!(output.join(SITEMAP_FILE).is_file());

        let index = std::fs::read_to_string(output.join("index.html")).unwrap();
        assert!(index.contains("Hello, world!"));
        assert!(index.contains("Second Post"));

        let sitemap = std::fs::read_to_string(output.join(SITEMAP_FILE)).unwrap();
        assert!(sitemap.contains("blog/2021/hello-world.html"));
        assert!(sitemap.contains("tags/rust.html"));
        Ok(())
    }

    #[test]
    fn test_post_processing_runs_only_in_production() -> Result<()> {
        // hello-world.md carries an HTML comment (the summary fold marker),
        // so a production build strips it and a development build keeps it.
        let output = fresh_output_dir("stapol-test-production");
        let mut config = test_config(&output);
        config.mode = BuildMode::Production;
        build_site(&config)?;
        let page = std::fs::read_to_string(output.join("blog/2021/hello-world.html")).unwrap();
        assert!(!page.contains("<!--"));

        let output = fresh_output_dir("stapol-test-development");
        build_site(&test_config(&output))?;
        let page = std::fs::read_to_string(output.join("blog/2021/hello-world.html")).unwrap();
        assert!(page.contains("<!-- more -->"));
        Ok(())
    }

    struct FailingRenderer {
        fail_id: &'static str,
    }

    impl Render for FailingRenderer {
        fn render(
            &self,
            unit: &Unit,
            _output_path: &str,
            _layout: &str,
            _routes: &RouteTable,
        ) -> render::Result<Vec<u8>> {
            if let Unit::Document(document) = unit {
                if document.id == self.fail_id {
                    return Err(render::Error::Template("broken template".to_owned()));
                }
            }
            Ok(b"<p>ok</p>".to_vec())
        }
    }

    #[test]
    fn test_feed_excludes_documents_that_failed_to_render() -> Result<()> {
        let output = fresh_output_dir("stapol-test-feed-failures");
        let config = test_config(&output);
        let renderer = FailingRenderer {
            fail_id: "second-post",
        };
        let result = Builder::new(&config, &renderer).build()?;

        assert_eq!(2, result.success_count);
        assert!(result.failures.iter().any(|f| f.unit == "second-post"));

        let feed = std::fs::read_to_string(output.join(FEED_FILE)).unwrap();
        assert!(feed.contains("blog/2021/hello-world.html"));
        assert!(!feed.contains("blog/2021/second-post.html"));
        Ok(())
    }

    #[test]
    fn test_build_is_deterministic() -> Result<()> {
        let output_a = fresh_output_dir("stapol-test-deterministic-a");
        let output_b = fresh_output_dir("stapol-test-deterministic-b");
        let a = build_site(&test_config(&output_a))?;
        let b = build_site(&test_config(&output_b))?;

        assert_eq!(a.output_paths, b.output_paths);
        for path in &a.output_paths {
            assert_eq!(
                std::fs::read(output_a.join(path)).unwrap(),
                std::fs::read(output_b.join(path)).unwrap(),
                "output `{}` differs between builds",
                path,
            );
        }
        Ok(())
    }

    #[test]
    fn test_build_detects_path_collision() {
        let output = fresh_output_dir("stapol-test-collision");
        let mut config = test_config(&output);
        config.content_directory = Path::new("./testdata/collision/").to_owned();
        match build_site(&config) {
            Err(Error::PathCollision { path, .. }) => {
                assert_eq!("blog/2023/same-title.html", path);
            }
            _ => panic!("wanted PathCollision error"),
        }
    }

    #[test]
    fn test_build_rejects_zero_page_size() {
        let output = fresh_output_dir("stapol-test-zero-page-size");
        let mut config = test_config(&output);
        config.page_size = 0;
        match build_site(&config) {
            Err(Error::Config(crate::config::Error::InvalidPageSize)) => {}
            _ => panic!("wanted InvalidPageSize error"),
        }
    }

    #[test]
    fn test_output_file_path_directory_indexes() {
        assert_eq!(
            PathBuf::from("blog/2023/a/index.html"),
            output_file_path("blog/2023/a.html", true),
        );
        assert_eq!(
            PathBuf::from("blog/2023/a.html"),
            output_file_path("blog/2023/a.html", false),
        );
        assert_eq!(PathBuf::from("index.html"), output_file_path("index.html", true));
    }

    #[test]
    fn test_public_path_directory_indexes() {
        assert_eq!("blog/2023/a/", public_path("blog/2023/a.html", true));
        assert_eq!("blog/2023/a.html", public_path("blog/2023/a.html", false));
        assert_eq!("", public_path("index.html", true));
    }
}
