//! Builds the tag index: a mapping from tag name to the documents carrying
//! that tag. Rebuilt from scratch every build; nothing is incremental.

use std::collections::BTreeMap;

use crate::content::Document;

/// Maps tag names to the documents carrying them. Backed by a [`BTreeMap`]
/// so iteration order is deterministic across runs.
pub struct TagIndex<'a>(BTreeMap<String, Vec<&'a Document>>);

impl<'a> TagIndex<'a> {
    /// Returns the documents for `tag`, newest first, or `None` if no
    /// document declares it.
    pub fn get(&self, tag: &str) -> Option<&[&'a Document]> {
        self.0.get(tag).map(|documents| documents.as_slice())
    }

    /// Iterates over `(tag, documents)` pairs in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[&'a Document])> {
        self.0
            .iter()
            .map(|(tag, documents)| (tag.as_str(), documents.as_slice()))
    }

    /// The number of distinct tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Indexes `documents` by tag. Every document appears exactly once per tag
/// it declares; within a tag, documents are ordered by date descending with
/// ties broken by id ascending. The ordering is imposed here rather than
/// assumed from the input, so the index is deterministic no matter how the
/// documents were collected.
pub fn index<'a>(documents: &[&'a Document]) -> TagIndex<'a> {
    let mut index: BTreeMap<String, Vec<&'a Document>> = BTreeMap::new();
    for document in documents {
        for tag in document.tags.iter() {
            index.entry(tag.clone()).or_default().push(document);
        }
    }
    for documents in index.values_mut() {
        documents.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
    }
    TagIndex(index)
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use chrono::NaiveDate;

    use super::*;
    use crate::content::Document;

    fn document(id: &str, date: &str, tags: &[&str]) -> Document {
        Document {
            id: id.to_owned(),
            title: id.to_owned(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            slug: id.to_owned(),
            tags: tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
            body: String::new(),
        }
    }

    #[test]
    fn test_index_membership() {
        let a = document("a", "2023-01-01", &["rust", "blog"]);
        let b = document("b", "2023-06-01", &["rust"]);
        let c = document("c", "2023-03-01", &[]);
        let documents: Vec<&Document> = vec![&a, &b, &c];
        let index = index(&documents);

        assert_eq!(2, index.len());
        let rust: Vec<&str> = index
            .get("rust")
            .unwrap()
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(vec!["b", "a"], rust);
        let blog: Vec<&str> = index
            .get("blog")
            .unwrap()
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(vec!["a"], blog);
        assert!(index.get("untagged").is_none());
    }

    #[test]
    fn test_index_orders_ties_by_id() {
        let a = document("a", "2023-01-01", &["t"]);
        let b = document("b", "2023-01-01", &["t"]);
        let z = document("z", "2023-01-01", &["t"]);
        // insertion order shouldn't matter
        let documents: Vec<&Document> = vec![&z, &a, &b];
        let index = index(&documents);
        let t: Vec<&str> = index
            .get("t")
            .unwrap()
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(vec!["a", "b", "z"], t);
    }

    #[test]
    fn test_index_empty_input() {
        let documents: Vec<&Document> = Vec::new();
        assert!(index(&documents).is_empty());
    }
}
