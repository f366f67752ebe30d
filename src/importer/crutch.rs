use std::collections::HashMap;
use std::hash::Hash;

/// Per-page lookup tables, one per declared crutch, keyed by record key.
#[derive(Debug, Clone)]
pub struct Crutches<K> {
    maps: HashMap<&'static str, HashMap<K, Vec<i64>>>,
}

impl<K: Eq + Hash> Crutches<K> {
    pub fn new() -> Self {
        Self {
            maps: HashMap::new(),
        }
    }

    /// Group `(key, value)` rows under `name`. Declaring a crutch with no
    /// rows still records it, so lookups can tell "empty" from "missing".
    pub fn insert_rows(&mut self, name: &'static str, rows: Vec<(K, i64)>) {
        let map = self.maps.entry(name).or_default();
        for (key, value) in rows {
            map.entry(key).or_default().push(value);
        }
    }

    pub fn get(&self, name: &str, key: &K) -> &[i64] {
        self.maps
            .get(name)
            .and_then(|map| map.get(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn first(&self, name: &str, key: &K) -> Option<i64> {
        self.get(name, key).first().copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.maps.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

impl<K: Eq + Hash> Default for Crutches<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_rows_by_key() {
        let mut crutches = Crutches::new();
        crutches.insert_rows("favourites", vec![(1_i64, 10), (2, 20), (1, 11)]);
        crutches.insert_rows("mentions", Vec::new());

        assert_eq!(crutches.get("favourites", &1), &[10, 11]);
        assert_eq!(crutches.get("favourites", &2), &[20]);
        assert!(crutches.get("favourites", &3).is_empty());
        assert!(crutches.contains("mentions"));
        assert!(crutches.get("mentions", &1).is_empty());
        assert!(crutches.get("votes", &1).is_empty());
        assert_eq!(crutches.first("favourites", &1), Some(10));
        assert_eq!(crutches.len(), 2);
    }
}
