//! Loads and validates the project configuration. A project is a directory
//! containing a `site.yaml` file, a content directory (`posts` by default),
//! and a `theme` directory; [`Config::from_directory`] searches upward from
//! the starting directory the way version control tools find their root.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

/// Whether the build is a development or production build. Production
/// builds run the output post-processors (HTML minification); development
/// builds skip them. Immutable for the duration of a build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildMode {
    Development,
    Production,
}

/// The author of the site, for feed metadata.
#[derive(Clone, Debug, Deserialize)]
pub struct Author {
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize)]
struct PageSize(usize);
impl Default for PageSize {
    fn default() -> Self {
        PageSize(20)
    }
}

/// The shape of `site.yaml`. Defaults mirror a conventional blog layout:
/// posts under `posts/`, permalinks like `blog/2021/hello-world.html`, tag
/// pages under `tags/`, twenty posts per index page.
#[derive(Deserialize)]
struct Project {
    title: String,
    site_root: Url,

    #[serde(default)]
    author: Option<Author>,

    #[serde(default = "Project::default_permalink")]
    permalink: String,

    #[serde(default = "Project::default_sources")]
    sources: PathBuf,

    #[serde(default = "Project::default_extension")]
    default_extension: String,

    #[serde(default)]
    page_size: PageSize,

    #[serde(default = "Project::default_page_link")]
    page_link: String,

    #[serde(default = "Project::default_tag_link")]
    tag_link: String,

    #[serde(default)]
    directory_indexes: bool,
}

impl Project {
    fn default_permalink() -> String {
        "blog/{year}/{title}.html".to_owned()
    }

    fn default_sources() -> PathBuf {
        PathBuf::from("posts")
    }

    fn default_extension() -> String {
        ".md".to_owned()
    }

    fn default_page_link() -> String {
        "page/{num}".to_owned()
    }

    fn default_tag_link() -> String {
        "tags/{tag}.html".to_owned()
    }
}

/// The fully-resolved build configuration handed to the orchestrator.
pub struct Config {
    pub title: String,
    pub site_root: Url,
    pub author: Option<Author>,

    /// The directory containing source documents.
    pub content_directory: PathBuf,

    /// The directory containing `theme.yaml` and the template files.
    pub theme_directory: PathBuf,

    /// The root of the output tree.
    pub output_directory: PathBuf,

    /// The permalink template for documents, e.g.
    /// `blog/{year}/{title}.html`.
    pub permalink: String,

    /// The source file extension, including the leading dot.
    pub default_extension: String,

    /// The number of documents per index page.
    pub page_size: usize,

    /// The page-link template for index pages past the first, e.g.
    /// `page/{num}`.
    pub page_link: String,

    /// The link template for the first page of each tag index, e.g.
    /// `tags/{tag}.html`.
    pub tag_link: String,

    /// Rewrite `foo.html` outputs as `foo/index.html` for extensionless
    /// URLs.
    pub directory_indexes: bool,

    /// Development or production build.
    pub mode: BuildMode,

    /// Worker threads for content loading.
    pub threads: usize,
}

impl Config {
    /// Searches `dir` and its ancestors for a `site.yaml` project file and
    /// loads the configuration from the first one found.
    pub fn from_directory(
        dir: &Path,
        output_directory: &Path,
        mode: BuildMode,
        threads: Option<usize>,
    ) -> Result<Config> {
        let path = dir.join("site.yaml");
        if path.exists() {
            Config::from_project_file(&path, output_directory, mode, threads)
        } else {
            match dir.parent() {
                Some(parent) => Config::from_directory(parent, output_directory, mode, threads),
                None => Err(Error::ProjectFileNotFound),
            }
        }
    }

    /// Loads the configuration from a specific project file. The content
    /// and theme directories are resolved relative to the project file's
    /// directory.
    pub fn from_project_file(
        path: &Path,
        output_directory: &Path,
        mode: BuildMode,
        threads: Option<usize>,
    ) -> Result<Config> {
        use std::fs::File;

        let file = File::open(path).map_err(|err| Error::Open {
            path: path.to_owned(),
            err,
        })?;
        let project: Project = serde_yaml::from_reader(file)?;
        let project_root = path.parent().ok_or_else(|| Error::NoParentDirectory {
            path: path.to_owned(),
        })?;

        let config = Config {
            title: project.title,
            site_root: project.site_root,
            author: project.author,
            content_directory: project_root.join(project.sources),
            theme_directory: project_root.join("theme"),
            output_directory: output_directory.to_owned(),
            permalink: project.permalink,
            default_extension: project.default_extension,
            page_size: project.page_size.0,
            page_link: project.page_link,
            tag_link: project.tag_link,
            directory_indexes: project.directory_indexes,
            mode,
            threads: match threads {
                None => num_cpus::get(),
                Some(threads) => threads,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the structural configuration invariants: a positive page
    /// size, and link templates that carry the tokens their expansion
    /// depends on. Violations are fatal; they abort the build before any
    /// work happens.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::InvalidPageSize);
        }
        if !self.page_link.contains("{num}") {
            return Err(Error::MissingToken {
                option: "page_link",
                token: "{num}",
            });
        }
        if !self.tag_link.contains("{tag}") {
            return Err(Error::MissingToken {
                option: "tag_link",
                token: "{tag}",
            });
        }
        Ok(())
    }
}

/// The result of a fallible configuration operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an invalid or unloadable configuration. All of these are
/// structural: they abort the build rather than being recorded per-item.
#[derive(Debug)]
pub enum Error {
    /// Returned when no `site.yaml` exists in the starting directory or any
    /// of its ancestors.
    ProjectFileNotFound,

    /// Returned for I/O problems opening the project file.
    Open { path: PathBuf, err: std::io::Error },

    /// Returned when the project file path has no parent directory.
    NoParentDirectory { path: PathBuf },

    /// Returned when the project file isn't valid YAML.
    DeserializeYaml(serde_yaml::Error),

    /// Returned when `page_size` is zero.
    InvalidPageSize,

    /// Returned when a link-template option lacks its required token.
    MissingToken {
        option: &'static str,
        token: &'static str,
    },
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ProjectFileNotFound => {
                write!(f, "could not find `site.yaml` in any parent directory")
            }
            Error::Open { path, err } => {
                write!(f, "opening project file '{}': {}", path.display(), err)
            }
            Error::NoParentDirectory { path } => write!(
                f,
                "can't get parent directory for project file path '{}'",
                path.display()
            ),
            Error::DeserializeYaml(err) => err.fmt(f),
            Error::InvalidPageSize => write!(f, "page_size must be greater than zero"),
            Error::MissingToken { option, token } => {
                write!(f, "`{}` must contain the `{}` token", option, token)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ProjectFileNotFound => None,
            Error::Open { path: _, err } => Some(err),
            Error::NoParentDirectory { path: _ } => None,
            Error::DeserializeYaml(err) => Some(err),
            Error::InvalidPageSize => None,
            Error::MissingToken { .. } => None,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator when deserializing the project file.
    fn from(err: serde_yaml::Error) -> Error {
        Error::DeserializeYaml(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_directory_searches_upward() -> Result<()> {
        // starting from a subdirectory of the project still finds site.yaml
        let config = Config::from_directory(
            Path::new("./testdata/posts/nested/"),
            Path::new("/tmp/out"),
            BuildMode::Development,
            Some(1),
        )?;
        assert_eq!("array.blue", config.title);
        assert_eq!("blog/{year}/{title}.html", config.permalink);
        assert_eq!(20, config.page_size);
        assert_eq!(".md", config.default_extension);
        assert!(config.content_directory.ends_with("testdata/posts"));
        assert!(config.theme_directory.ends_with("testdata/theme"));
        Ok(())
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = Config::from_project_file(
            Path::new("./testdata/site.yaml"),
            Path::new("/tmp/out"),
            BuildMode::Development,
            Some(1),
        )
        .unwrap();
        config.page_size = 0;
        match config.validate() {
            Err(Error::InvalidPageSize) => {}
            _ => panic!("wanted InvalidPageSize error"),
        }
    }

    #[test]
    fn test_validate_rejects_page_link_without_num() {
        let mut config = Config::from_project_file(
            Path::new("./testdata/site.yaml"),
            Path::new("/tmp/out"),
            BuildMode::Development,
            Some(1),
        )
        .unwrap();
        config.page_link = "page".to_owned();
        match config.validate() {
            Err(Error::MissingToken { option, token }) => {
                assert_eq!("page_link", option);
                assert_eq!("{num}", token);
            }
            _ => panic!("wanted MissingToken error"),
        }
    }
}
