//! An ordered, keyed collection of features.
//!
//! Tools are keyed by name, prompts by name, resources by URI and templates
//! by URI template. Iteration is always in ascending key order, which is what
//! makes cursor pagination stable across mutations.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::cursor::{decode_cursor, encode_cursor};
use crate::error::McpError;

/// Default number of items per `*/list` page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// An ordered map from unique key to feature.
#[derive(Debug, Clone)]
pub struct FeatureSet<T> {
    key: fn(&T) -> &str,
    items: BTreeMap<String, T>,
}

impl<T> FeatureSet<T> {
    /// Create an empty set whose keys are computed by `key`.
    #[must_use]
    pub fn new(key: fn(&T) -> &str) -> Self {
        Self {
            key,
            items: BTreeMap::new(),
        }
    }

    /// Insert features, replacing any with the same key.
    pub fn add(&mut self, features: impl IntoIterator<Item = T>) {
        for feature in features {
            let key = (self.key)(&feature).to_string();
            self.items.insert(key, feature);
        }
    }

    /// Remove features by key. Returns whether anything was removed.
    pub fn remove<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) -> bool {
        let mut removed = false;
        for key in keys {
            removed |= self.items.remove(key).is_some();
        }
        removed
    }

    /// Exact lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.get(key)
    }

    /// All features in ascending key order.
    pub fn all(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    /// Features whose key is strictly greater than `key`, ascending.
    pub fn above<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a T> + 'a {
        self.items
            .range::<str, _>((Bound::Excluded(key), Bound::Unbounded))
            .map(|(_, v)| v)
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Return one page of features starting after `cursor`.
    ///
    /// The second element is the cursor of the next page, or `None` on the
    /// last page. `method` names the list request in the invalid-cursor
    /// error.
    pub fn page(
        &self,
        method: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<(Vec<&T>, Option<String>), McpError> {
        let page_size = page_size.max(1);
        let mut items: Vec<&T> = match cursor.filter(|c| !c.is_empty()) {
            None => self.all().take(page_size + 1).collect(),
            Some(cursor) => {
                let last_uid = decode_cursor(method, cursor)?;
                self.above(&last_uid).take(page_size + 1).collect()
            }
        };
        if items.len() <= page_size {
            return Ok((items, None));
        }
        items.truncate(page_size);
        let next = items.last().map(|last| encode_cursor((self.key)(last)));
        Ok((items, next))
    }
}
