//! Logbook entry model.

use serde::Serialize;

/// Attribute holding the entry id.
pub const ATTR_ID: &str = "$@MID@$";
/// Attribute holding the entry date.
pub const ATTR_DATE: &str = "Date";
/// Attribute holding the entry author.
pub const ATTR_AUTHOR: &str = "Author";
/// Attribute holding the entry subject.
pub const ATTR_SUBJECT: &str = "Subject";
/// Attribute listing attached files.
pub const ATTR_ATTACHMENT: &str = "Attachment";
/// Attribute holding the body encoding (`HTML`, `ELCode` or `plain`).
pub const ATTR_ENCODING: &str = "Encoding";
/// Attribute added before templating, holding the entry URL.
pub const ATTR_ENTRY_URL: &str = "EntryUrl";

/// Entry attributes in the order the logbook sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    pairs: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of `key`, or an empty string.
    pub fn get_or_empty(&self, key: &str) -> &str {
        self.get(key).unwrap_or_default()
    }

    /// Set `key`, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut attributes = Self::new();
        for (key, value) in iter {
            attributes.insert(key, value);
        }
        attributes
    }
}

/// One logbook entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: u64,
    /// HTML body.
    pub body: String,
    pub attributes: Attributes,
    /// URLs of attached files.
    pub attachments: Vec<String>,
}

impl Entry {
    /// Public URL of the entry in the logbook at `base`.
    pub fn url(&self, base: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), self.id)
    }
}

/// Row stored once an entry has been published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedRecord {
    pub entry_id: i64,
    pub entry_date: String,
    pub entry_author: String,
}

impl PublishedRecord {
    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            entry_id: entry.id as i64,
            entry_date: entry.attributes.get_or_empty(ATTR_DATE).to_string(),
            entry_author: entry.attributes.get_or_empty(ATTR_AUTHOR).to_string(),
        }
    }
}
