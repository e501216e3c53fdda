//! The rendering seam. The build orchestrator hands each output unit (a
//! document page, a main index page, or a tag index page) to a [`Render`]
//! implementation along with its output path and a layout name, and gets
//! back finished bytes. The default implementation, [`TemplateSet`], loads
//! named gtmpl layouts from a theme directory; the orchestrator itself
//! never touches template syntax.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use gtmpl::Template;
use gtmpl_value::Value;
use serde::Deserialize;
use url::Url;

use crate::content::Document;
use crate::page::Page;

/// Maps document ids to their resolved site-relative output paths. Index
/// pages need this to link their items to the documents' permalinks.
pub struct RouteTable(HashMap<String, String>);

impl RouteTable {
    pub fn new() -> RouteTable {
        RouteTable(HashMap::new())
    }

    pub fn insert(&mut self, id: &str, path: &str) {
        self.0.insert(id.to_owned(), path.to_owned());
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.0.get(id).map(|path| path.as_str())
    }
}

impl Default for RouteTable {
    fn default() -> RouteTable {
        RouteTable::new()
    }
}

/// One renderable output unit.
pub enum Unit<'a> {
    /// A single document page.
    Document(&'a Document),

    /// One page of the main (all-documents) index.
    Index(&'a Page<'a>),

    /// One page of a tag index.
    Tag { name: &'a str, page: &'a Page<'a> },
}

/// Renders one output unit to finished bytes. Invoked exactly once per
/// output file.
pub trait Render {
    fn render(
        &self,
        unit: &Unit,
        output_path: &str,
        layout: &str,
        routes: &RouteTable,
    ) -> Result<Vec<u8>>;
}

#[derive(Deserialize)]
struct Theme {
    /// Maps a layout name to the template files (relative to the theme
    /// directory) that are concatenated and parsed as that layout.
    templates: BTreeMap<String, Vec<PathBuf>>,
}

/// A set of named gtmpl layouts loaded from a theme directory, plus the
/// site-wide values every template can see.
pub struct TemplateSet {
    templates: HashMap<String, Template>,

    /// The site's root URL, exposed to templates as `site_root`.
    site_root: Url,

    /// The site's title, exposed to templates as `site_title`.
    site_title: String,
}

impl TemplateSet {
    /// Loads a [`TemplateSet`] from a theme directory containing a
    /// `theme.yaml` manifest. Each layout's template files are loaded,
    /// concatenated, and parsed into a single [`Template`].
    pub fn load(theme_dir: &Path, site_root: &Url, site_title: &str) -> Result<TemplateSet> {
        use std::fs::File;

        let manifest_path = theme_dir.join("theme.yaml");
        let manifest = File::open(&manifest_path).map_err(|err| Error::OpenTemplateFile {
            path: manifest_path,
            err,
        })?;
        let theme: Theme = serde_yaml::from_reader(manifest)?;

        let mut templates = HashMap::new();
        for (layout, files) in theme.templates {
            let template = parse_template(files.iter().map(|relpath| theme_dir.join(relpath)))?;
            templates.insert(layout, template);
        }
        Ok(TemplateSet {
            templates,
            site_root: site_root.clone(),
            site_title: site_title.to_owned(),
        })
    }
}

impl Render for TemplateSet {
    /// Converts the unit into a template context, picks the named layout,
    /// and executes it into a byte buffer.
    fn render(
        &self,
        unit: &Unit,
        output_path: &str,
        layout: &str,
        routes: &RouteTable,
    ) -> Result<Vec<u8>> {
        let template = self
            .templates
            .get(layout)
            .ok_or_else(|| Error::UnknownLayout(layout.to_owned()))?;

        let mut value = unit_value(unit, routes);
        if let Value::Object(obj) = &mut value {
            obj.insert("path".to_owned(), Value::String(output_path.to_owned()));
            obj.insert(
                "site_root".to_owned(),
                Value::String(self.site_root.to_string()),
            );
            obj.insert(
                "site_title".to_owned(),
                Value::String(self.site_title.clone()),
            );
        }

        let context = gtmpl::Context::from(value).map_err(Error::Template)?;
        let mut rendered = Vec::new();
        template.execute(&mut rendered, &context)?;
        Ok(rendered)
    }
}

// Loads the template file contents, concatenates them, and parses the
// result into a template.
fn parse_template<P: AsRef<Path>>(template_files: impl Iterator<Item = P>) -> Result<Template> {
    use std::fs::File;
    use std::io::Read;

    let mut contents = String::new();
    for template_file in template_files {
        let template_file = template_file.as_ref();
        File::open(template_file)
            .map_err(|err| Error::OpenTemplateFile {
                path: template_file.to_owned(),
                err,
            })?
            .read_to_string(&mut contents)?;
        contents.push(' ');
    }

    let mut template = Template::default();
    template.parse(&contents).map_err(Error::Template)?;
    Ok(template)
}

fn unit_value(unit: &Unit, routes: &RouteTable) -> Value {
    match unit {
        Unit::Document(document) => document_value(document, routes),
        Unit::Index(page) => page_value(page, routes),
        Unit::Tag { name, page } => {
            let mut value = page_value(page, routes);
            if let Value::Object(obj) = &mut value {
                obj.insert("tag".to_owned(), Value::String(name.to_string()));
            }
            value
        }
    }
}

/// Converts a [`Document`] into a [`Value`] with fields `title`, `date`,
/// `slug`, `body`, `summary`, `summarized`, `tags`, and `url` (the
/// document's resolved path, or nil if it has none).
fn document_value(document: &Document, routes: &RouteTable) -> Value {
    let (summary, summarized) = document.summary();
    let mut m: HashMap<String, Value> = HashMap::new();
    m.insert("title".to_owned(), Value::String(document.title.clone()));
    m.insert(
        "date".to_owned(),
        Value::String(document.date.format("%Y-%m-%d").to_string()),
    );
    m.insert("slug".to_owned(), Value::String(document.slug.clone()));
    m.insert("body".to_owned(), Value::String(document.body.clone()));
    m.insert("summary".to_owned(), Value::String(summary.to_owned()));
    m.insert("summarized".to_owned(), Value::Bool(summarized));
    m.insert(
        "tags".to_owned(),
        Value::Array(
            document
                .tags
                .iter()
                .map(|tag| Value::String(tag.clone()))
                .collect(),
        ),
    );
    m.insert(
        "url".to_owned(),
        match routes.get(&document.id) {
            Some(path) => Value::String(path.to_owned()),
            None => Value::Nil,
        },
    );
    Value::Object(m)
}

/// Converts a [`Page`] into a [`Value`] with fields `items`, `number`,
/// `prev`, and `next`.
fn page_value(page: &Page, routes: &RouteTable) -> Value {
    let option_to_value = |opt: &Option<String>| match opt {
        Some(path) => Value::String(path.clone()),
        None => Value::Nil,
    };

    let mut m: HashMap<String, Value> = HashMap::new();
    m.insert(
        "items".to_owned(),
        Value::Array(
            page.documents
                .iter()
                .map(|document| document_value(document, routes))
                .collect(),
        ),
    );
    m.insert("number".to_owned(), Value::from(page.number as u64));
    m.insert("prev".to_owned(), option_to_value(&page.prev_path));
    m.insert("next".to_owned(), option_to_value(&page.next_path));
    Value::Object(m)
}

/// The result of a fallible rendering operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error rendering an output unit.
#[derive(Debug)]
pub enum Error {
    /// Returned when a unit names a layout the theme doesn't define.
    UnknownLayout(String),

    /// Returned for errors parsing or executing templates.
    Template(String),

    /// Returned for I/O problems while opening template files.
    OpenTemplateFile { path: PathBuf, err: std::io::Error },

    /// Returned when the theme manifest isn't valid YAML.
    DeserializeYaml(serde_yaml::Error),

    /// Returned for other I/O errors.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnknownLayout(layout) => write!(f, "unknown layout `{}`", layout),
            Error::Template(err) => err.fmt(f),
            Error::OpenTemplateFile { path, err } => {
                write!(f, "opening template file '{}': {}", path.display(), err)
            }
            Error::DeserializeYaml(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::UnknownLayout(_) => None,
            Error::Template(_) => None,
            Error::OpenTemplateFile { path: _, err } => Some(err),
            Error::DeserializeYaml(err) => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<String> for Error {
    /// Converts a template error message ([`String`]) into an [`Error`].
    /// This allows us to use the `?` operator for fallible template
    /// operations.
    fn from(err: String) -> Error {
        Error::Template(err)
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator when reading the theme manifest.
    fn from(err: serde_yaml::Error) -> Error {
        Error::DeserializeYaml(err)
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
    use std::collections::BTreeSet;

    use chrono::NaiveDate;

    use super::*;

    fn document() -> Document {
        Document {
            id: "hello-world".to_owned(),
            title: "Hello, world!".to_owned(),
            date: NaiveDate::parse_from_str("2021-04-16", "%Y-%m-%d").unwrap(),
            slug: "hello-world".to_owned(),
            tags: BTreeSet::new(),
            body: "<p>Body.</p>".to_owned(),
        }
    }

    #[test]
    fn test_template_set_renders_document() -> Result<()> {
        let site_root = Url::parse("https://example.org/").unwrap();
        let templates =
            TemplateSet::load(Path::new("./testdata/theme/"), &site_root, "array.blue")?;

        let document = document();
        let mut routes = RouteTable::new();
        routes.insert("hello-world", "blog/2021/hello-world.html");
        let rendered = templates.render(
            &Unit::Document(&document),
            "blog/2021/hello-world.html",
            "layout",
            &routes,
        )?;
        let rendered = String::from_utf8(rendered).unwrap();
        assert!(rendered.contains("Hello, world!"));
        assert!(rendered.contains("<p>Body.</p>"));
        Ok(())
    }

    #[test]
    fn test_template_set_unknown_layout() -> Result<()> {
        let site_root = Url::parse("https://example.org/").unwrap();
        let templates =
            TemplateSet::load(Path::new("./testdata/theme/"), &site_root, "array.blue")?;
        let document = document();
        match templates.render(
            &Unit::Document(&document),
            "out.html",
            "missing",
            &RouteTable::new(),
        ) {
            Err(Error::UnknownLayout(layout)) => assert_eq!("missing", layout),
            _ => panic!("wanted UnknownLayout error"),
        }
        Ok(())
    }
}
