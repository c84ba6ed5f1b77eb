use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Hash used for both node ids and keys. `DefaultHasher::new` uses fixed
/// keys, so placement is identical on every node running the same build.
pub fn hash_key(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

/// Consistent-hash ring over node addresses. A key belongs to the first node
/// whose hash is at or after the key's hash, wrapping around at the end.
#[derive(Debug, Clone, Default)]
pub struct HashRing {
    nodes: BTreeMap<u64, String>,
}

impl HashRing {
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ring = HashRing::default();
        for node in nodes {
            ring.add(node.into());
        }
        ring
    }

    /// Empty node ids are ignored.
    pub fn add(&mut self, node: String) {
        if node.is_empty() {
            return;
        }
        self.nodes.insert(hash_key(node.as_bytes()), node);
    }

    pub fn remove(&mut self, node: &str) {
        self.nodes.remove(&hash_key(node.as_bytes()));
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.values().map(String::as_str)
    }

    pub fn get(&self, key: &[u8]) -> Option<&str> {
        let hash = hash_key(key);
        self.nodes
            .range(hash..)
            .next()
            .or_else(|| self.nodes.iter().next())
            .map(|(_, node)| node.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<String> {
        (0..2000).map(|i| format!("key:{i}")).collect()
    }

    #[test]
    fn test_empty_ring() {
        let ring = HashRing::new(Vec::<String>::new());
        assert!(ring.is_empty());
        assert_eq!(ring.get(b"k"), None);
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let a = HashRing::new(["n1:6379", "n2:6379", "n3:6379"]);
        let b = HashRing::new(["n3:6379", "n1:6379", "n2:6379", ""]);
        assert_eq!(a.len(), 3);
        assert_eq!(b.len(), 3);
        for key in keys() {
            assert_eq!(a.get(key.as_bytes()), b.get(key.as_bytes()));
        }
    }

    #[test]
    fn test_wraps_to_first_node() {
        let ring = HashRing::new(["only"]);
        assert_eq!(ring.get(b"anything"), Some("only"));
        let ring = HashRing::new(["a", "b"]);
        let max = ring.nodes.keys().last().copied().unwrap();
        let first = ring.nodes.values().next().unwrap().clone();
        // Any key hashing above the last node lands on the first.
        let key = (0u64..)
            .map(|i| format!("sample-{i}"))
            .find(|k| hash_key(k.as_bytes()) > max)
            .unwrap();
        assert_eq!(ring.get(key.as_bytes()), Some(first.as_str()));
    }

    #[test]
    fn test_removal_only_moves_departed_keys() {
        let full = HashRing::new(["n1", "n2", "n3", "n4"]);
        let mut reduced = full.clone();
        reduced.remove("n3");

        for key in keys() {
            let before = full.get(key.as_bytes()).unwrap();
            let after = reduced.get(key.as_bytes()).unwrap();
            if before != "n3" {
                assert_eq!(before, after, "{key} moved although its node stayed");
            } else {
                assert_ne!(after, "n3");
            }
        }
    }
}
