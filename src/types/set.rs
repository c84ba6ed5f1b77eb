use rand::Rng;
use rand::seq::IteratorRandom;
use std::collections::HashSet;

/// Unordered set of byte-string members.
#[derive(Debug, Clone, Default)]
pub struct MemberSet {
    members: HashSet<Vec<u8>>,
}

impl MemberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns true if the member was not already present.
    pub fn add(&mut self, member: Vec<u8>) -> bool {
        self.members.insert(member)
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        self.members.remove(member)
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.members.contains(member)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.members.iter()
    }

    pub fn random_member(&self) -> Option<&Vec<u8>> {
        self.members.iter().choose(&mut rand::thread_rng())
    }

    /// Sample members. A positive count draws with replacement, so members may
    /// repeat; a negative count draws `|count|` distinct members, capped at the
    /// set size.
    pub fn random_members(&self, count: i64) -> Vec<Vec<u8>> {
        let mut rng = rand::thread_rng();
        if count < 0 {
            let count = (count.unsigned_abs() as usize).min(self.members.len());
            return self
                .members
                .iter()
                .choose_multiple(&mut rng, count)
                .into_iter()
                .cloned()
                .collect();
        }

        let pool: Vec<&Vec<u8>> = self.members.iter().collect();
        if pool.is_empty() {
            return Vec::new();
        }
        (0..count)
            .map(|_| pool[rng.gen_range(0..pool.len())].clone())
            .collect()
    }
}

impl FromIterator<Vec<u8>> for MemberSet {
    fn from_iter<I: IntoIterator<Item = Vec<u8>>>(iter: I) -> Self {
        MemberSet {
            members: iter.into_iter().collect(),
        }
    }
}
