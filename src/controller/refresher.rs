//! Keeps a published, de-duplicated list of live process names and reports
//! what changed on each refresh, so a list view can be patched in place
//! without losing its selection.

use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessListDiff {
    /// Display names that appeared, sorted case-insensitively.
    pub added: Vec<String>,
    /// Display names that went away, sorted case-insensitively.
    pub removed: Vec<String>,
}

impl ProcessListDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ProcessListRefresher {
    // lowercase key -> display name (first casing seen)
    published: BTreeMap<String, String>,
    selected: HashSet<String>,
}

impl ProcessListRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published set with `names` and return the difference.
    /// Blank names are ignored. Removed names drop out of the selection.
    pub fn apply<'a, I>(&mut self, names: I) -> ProcessListDiff
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut next: BTreeMap<String, String> = BTreeMap::new();
        for name in names {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let key = name.to_lowercase();
            // Keep the display casing already on screen if the name survives.
            let display = self.published.get(&key).cloned().unwrap_or_else(|| name.to_string());
            next.entry(key).or_insert(display);
        }

        let added = next
            .iter()
            .filter(|(key, _)| !self.published.contains_key(*key))
            .map(|(_, display)| display.clone())
            .collect();
        let removed = self
            .published
            .iter()
            .filter(|(key, _)| !next.contains_key(*key))
            .map(|(_, display)| display.clone())
            .collect();

        self.selected.retain(|key| next.contains_key(key));
        self.published = next;
        ProcessListDiff { added, removed }
    }

    /// Published display names, sorted case-insensitively.
    pub fn names(&self) -> Vec<&str> {
        self.published.values().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.published.len()
    }

    pub fn is_empty(&self) -> bool {
        self.published.is_empty()
    }

    /// Select a published name. Returns false if it is not published.
    pub fn select(&mut self, name: &str) -> bool {
        let key = name.trim().to_lowercase();
        if self.published.contains_key(&key) {
            self.selected.insert(key);
            true
        } else {
            false
        }
    }

    pub fn deselect(&mut self, name: &str) -> bool {
        self.selected.remove(&name.trim().to_lowercase())
    }

    pub fn is_selected(&self, name: &str) -> bool {
        self.selected.contains(&name.trim().to_lowercase())
    }

    pub fn selected_names(&self) -> Vec<&str> {
        self.published
            .iter()
            .filter(|(key, _)| self.selected.contains(*key))
            .map(|(_, display)| display.as_str())
            .collect()
    }
}
