//! Page records and extraction trees
//!
//! A [`Page`] is one resource discovered by the crawl: an HTML document to be
//! parsed, or a binary file to be exported. Pages are serialized to
//! flexbuffers for the on-disk cache and fingerprinted with SHA-256 for
//! change detection.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from encoding or decoding a page record
#[derive(Debug, Error)]
pub enum PageError {
    #[error("Failed to serialize page: {0}")]
    Serialize(#[from] flexbuffers::SerializationError),

    #[error("Failed to deserialize page: {0}")]
    Deserialize(#[from] flexbuffers::DeserializationError),

    #[error("Malformed page record: {0}")]
    Malformed(#[from] flexbuffers::ReaderError),
}

/// One resource discovered by the crawl
///
/// A page flows through the pipeline by single-owner handoff: the parser
/// constructs it, the fetcher fills `full_url`, `final_url` and `body`, the
/// parser attaches `tree`, and the logist persists it. Once persisted it is
/// immutable until the next crawl run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Name of the grammar entity this page is parsed with
    pub name: String,

    /// URL exactly as discovered in the source HTML (may be relative)
    pub url: String,

    /// Absolute URL of the page that discovered this one
    #[serde(default)]
    pub referrer_url: Option<String>,

    /// Resolved absolute URL actually requested
    #[serde(default)]
    pub full_url: Option<String>,

    /// URL after all HTTP redirects
    #[serde(default)]
    pub final_url: Option<String>,

    /// True when `body` holds a downloaded file rather than a parseable page
    #[serde(default)]
    pub is_file: bool,

    /// File name from the Content-Disposition header or the final URL path
    #[serde(default)]
    pub file_name: Option<String>,

    /// Raw response bytes
    #[serde(default)]
    pub body: Vec<u8>,

    /// Extracted field tree; absent for files and unfetched pages
    #[serde(default)]
    pub tree: Option<Block>,

    /// Content fingerprint recorded at the last persist
    #[serde(default)]
    pub hash: Option<Vec<u8>>,
}

impl Page {
    /// Creates a page to be fetched and parsed under the given entity name
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Page {
            name: name.into(),
            url: url.into(),
            ..Page::default()
        }
    }

    /// Creates a page whose body is a binary file to download
    pub fn file(name: impl Into<String>, url: impl Into<String>) -> Self {
        Page {
            name: name.into(),
            url: url.into(),
            is_file: true,
            ..Page::default()
        }
    }

    /// Serializes the page record for persistence
    pub fn to_bytes(&self) -> Result<Vec<u8>, PageError> {
        let mut serializer = flexbuffers::FlexbufferSerializer::new();
        self.serialize(&mut serializer)?;
        Ok(serializer.take_buffer())
    }

    /// Reads a page record back from its serialized form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PageError> {
        let reader = flexbuffers::Reader::get_root(bytes)?;
        Ok(Page::deserialize(reader)?)
    }

    /// Computes the content fingerprint of this page
    ///
    /// The fingerprint is SHA-256 over the serialized record with the `hash`
    /// field cleared, so it is deterministic across runs and survives a
    /// serialize/deserialize round trip.
    pub fn content_hash(&self) -> Result<Vec<u8>, PageError> {
        let mut stripped = self.clone();
        stripped.hash = None;

        let bytes = stripped.to_bytes()?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hasher.finalize().to_vec())
    }

    /// Recomputes the fingerprint and records it if it changed
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The content changed since the last recorded hash
    /// * `Ok(false)` - The content is unchanged
    /// * `Err(PageError)` - The record could not be serialized for hashing
    pub fn refresh_hash(&mut self) -> Result<bool, PageError> {
        let current = self.content_hash()?;
        if self.hash.as_deref() == Some(current.as_slice()) {
            return Ok(false);
        }

        self.hash = Some(current);
        Ok(true)
    }
}

/// One extraction subtree of a page's parsed content
///
/// Fields keep the order the grammar routes declared them in, and every
/// value sequence keeps document order. This is an ordered list rather than
/// a map so the order survives serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    fields: Vec<Field>,
}

/// A named field inside a [`Block`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub values: Vec<Value>,
}

/// A single extracted value: a leaf string or a nested block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Block(Block),
}

impl Value {
    /// Returns the leaf string, or `None` for a nested block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            Value::Block(_) => None,
        }
    }
}

impl Block {
    pub fn new() -> Self {
        Block::default()
    }

    /// Sets a field's values, replacing any earlier field of the same name
    ///
    /// Replacement keeps the original position so field order still follows
    /// the first route that produced the name.
    pub fn set_field(&mut self, name: impl Into<String>, values: Vec<Value>) {
        let name = name.into();
        match self.fields.iter_mut().find(|field| field.name == name) {
            Some(field) => field.values = values,
            None => self.fields.push(Field { name, values }),
        }
    }

    /// Returns the values stored under a field name
    pub fn values(&self, name: &str) -> Option<&[Value]> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.values.as_slice())
    }

    /// Iterates fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_page() -> Page {
        let mut tree = Block::new();
        tree.set_field(
            "title",
            vec![Value::Text("First Post".to_string())],
        );
        tree.set_field("body", vec![Value::Text("hello".to_string())]);

        Page {
            name: "post".to_string(),
            url: "/posts/1".to_string(),
            referrer_url: Some("http://example.com/".to_string()),
            full_url: Some("http://example.com/posts/1".to_string()),
            final_url: Some("http://example.com/posts/1".to_string()),
            is_file: false,
            file_name: None,
            body: b"<html><h1>First Post</h1></html>".to_vec(),
            tree: Some(tree),
            hash: None,
        }
    }

    #[test]
    fn test_serialize_roundtrip() {
        let page = create_test_page();
        let bytes = page.to_bytes().unwrap();
        let restored = Page::from_bytes(&bytes).unwrap();
        assert_eq!(page, restored);
    }

    #[test]
    fn test_content_hash_survives_roundtrip() {
        let page = create_test_page();
        let bytes = page.to_bytes().unwrap();
        let restored = Page::from_bytes(&bytes).unwrap();

        assert_eq!(
            page.content_hash().unwrap(),
            restored.content_hash().unwrap()
        );
    }

    #[test]
    fn test_content_hash_ignores_recorded_hash() {
        let mut page = create_test_page();
        let before = page.content_hash().unwrap();

        page.hash = Some(vec![0xaa; 32]);
        assert_eq!(page.content_hash().unwrap(), before);
    }

    #[test]
    fn test_refresh_hash_detects_change() {
        let mut page = create_test_page();

        // First refresh always records a hash
        assert!(page.refresh_hash().unwrap());
        // Nothing changed since
        assert!(!page.refresh_hash().unwrap());

        page.body = b"different".to_vec();
        assert!(page.refresh_hash().unwrap());
    }

    #[test]
    fn test_new_page_has_no_tree() {
        let page = Page::new("post", "/posts/1");
        assert!(page.tree.is_none());
        assert!(!page.is_file);
        assert!(page.hash.is_none());
    }

    #[test]
    fn test_file_page() {
        let page = Page::file("audio", "/files/song.mp3");
        assert!(page.is_file);
    }

    #[test]
    fn test_block_preserves_field_order() {
        let mut block = Block::new();
        block.set_field("zulu", vec![Value::Text("1".to_string())]);
        block.set_field("alpha", vec![Value::Text("2".to_string())]);
        block.set_field("mike", vec![Value::Text("3".to_string())]);

        let names: Vec<&str> = block.fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["zulu", "alpha", "mike"]);
    }

    #[test]
    fn test_block_replaces_duplicate_field_in_place() {
        let mut block = Block::new();
        block.set_field("a", vec![Value::Text("old".to_string())]);
        block.set_field("b", vec![Value::Text("other".to_string())]);
        block.set_field("a", vec![Value::Text("new".to_string())]);

        let names: Vec<&str> = block.fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(
            block.values("a").unwrap(),
            &[Value::Text("new".to_string())]
        );
    }

    #[test]
    fn test_nested_block_roundtrip() {
        let mut inner = Block::new();
        inner.set_field("num", vec![Value::Text("7".to_string())]);

        let mut tree = Block::new();
        tree.set_field("tracks", vec![Value::Block(inner)]);

        let mut page = Page::new("album", "/albums/1");
        page.tree = Some(tree);

        let restored = Page::from_bytes(&page.to_bytes().unwrap()).unwrap();
        assert_eq!(page, restored);
    }
}
