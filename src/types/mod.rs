pub mod border;
pub mod list;
pub mod set;
pub mod skiplist;
pub mod sorted_set;

use std::collections::HashMap;

/// The value held by one key.
#[derive(Debug, Clone)]
pub enum DataEntity {
    String(Vec<u8>),
    Hash(HashMap<String, Vec<u8>>),
    List(list::LinkedList),
    Set(set::MemberSet),
    SortedSet(sorted_set::SortedSet),
}

impl DataEntity {
    pub fn type_name(&self) -> &'static str {
        match self {
            DataEntity::String(_) => "string",
            DataEntity::Hash(_) => "hash",
            DataEntity::List(_) => "list",
            DataEntity::Set(_) => "set",
            DataEntity::SortedSet(_) => "zset",
        }
    }

    /// Whether the container has become empty and the key should go away.
    /// Strings are never considered empty.
    pub fn is_empty_container(&self) -> bool {
        match self {
            DataEntity::String(_) => false,
            DataEntity::Hash(h) => h.is_empty(),
            DataEntity::List(l) => l.is_empty(),
            DataEntity::Set(s) => s.is_empty(),
            DataEntity::SortedSet(z) => z.is_empty(),
        }
    }
}

impl DataEntity {
    pub fn as_string(&self) -> Option<&Vec<u8>> {
        match self {
            DataEntity::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&HashMap<String, Vec<u8>>> {
        match self {
            DataEntity::Hash(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_hash_mut(&mut self) -> Option<&mut HashMap<String, Vec<u8>>> {
        match self {
            DataEntity::Hash(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&list::LinkedList> {
        match self {
            DataEntity::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut list::LinkedList> {
        match self {
            DataEntity::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&set::MemberSet> {
        match self {
            DataEntity::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_set_mut(&mut self) -> Option<&mut set::MemberSet> {
        match self {
            DataEntity::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sorted_set(&self) -> Option<&sorted_set::SortedSet> {
        match self {
            DataEntity::SortedSet(z) => Some(z),
            _ => None,
        }
    }

    pub fn as_sorted_set_mut(&mut self) -> Option<&mut sorted_set::SortedSet> {
        match self {
            DataEntity::SortedSet(z) => Some(z),
            _ => None,
        }
    }
}
