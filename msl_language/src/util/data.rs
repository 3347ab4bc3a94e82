use indexmap::map::Entry;
use indexmap::IndexMap;
use std::hash::Hash;

pub trait IndexMapExt<K, V> {
    /// The same as [IndexMap::insert], but never replaces an existing entry.
    /// If the key is already present, the rejected value is handed back.
    fn insert_first(&mut self, key: K, value: V) -> Result<&mut V, V>;
}

impl<K: Eq + Hash, V> IndexMapExt<K, V> for IndexMap<K, V> {
    fn insert_first(&mut self, key: K, value: V) -> Result<&mut V, V> {
        match self.entry(key) {
            Entry::Occupied(_) => Err(value),
            Entry::Vacant(entry) => Ok(entry.insert(value)),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::util::data::IndexMapExt;
    use indexmap::IndexMap;

    #[test]
    fn insert_first_keeps_existing() {
        let mut map = IndexMap::new();
        assert!(map.insert_first("a", 1).is_ok());
        assert_eq!(map.insert_first("a", 2), Err(2));
        assert_eq!(map["a"], 1);
    }
}
