use std::collections::HashSet;

/// Ordered set of process names to sample each tick.
///
/// Identity is case-insensitive; the first-seen casing is kept for display.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WatchList {
    names: Vec<String>,
}

impl WatchList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a raw sequence, dropping blanks and case-insensitive duplicates.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::new();
        for name in names {
            list.add(name.as_ref());
        }
        list
    }

    /// Add a name. Returns false if it is blank or already present.
    pub fn add(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.names.push(name.to_string());
        true
    }

    /// Remove a name, matched case-insensitively.
    pub fn remove(&mut self, name: &str) -> bool {
        let key = name.trim().to_lowercase();
        let before = self.names.len();
        self.names.retain(|n| n.to_lowercase() != key);
        self.names.len() != before
    }

    pub fn contains(&self, name: &str) -> bool {
        let key = name.trim().to_lowercase();
        self.names.iter().any(|n| n.to_lowercase() == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Lower-cased snapshot of the names, used as the session's match set.
    pub fn name_set(&self) -> HashSet<String> {
        self.names.iter().map(|n| n.to_lowercase()).collect()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.names.clone()
    }
}
