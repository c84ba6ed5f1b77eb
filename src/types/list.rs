/// Doubly-linked list of byte strings.
///
/// Nodes live in an arena and link to each other by slot index; freed slots
/// are recycled through a free list.
#[derive(Debug, Clone, Default)]
pub struct LinkedList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

#[derive(Debug, Clone, Default)]
struct Node {
    value: Vec<u8>,
    prev: Option<usize>,
    next: Option<usize>,
}

impl LinkedList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push_front(&mut self, value: Vec<u8>) {
        let idx = self.alloc(value);
        self.nodes[idx].next = self.head;
        match self.head {
            Some(h) => self.nodes[h].prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
        self.len += 1;
    }

    pub fn push_back(&mut self, value: Vec<u8>) {
        let idx = self.alloc(value);
        self.nodes[idx].prev = self.tail;
        match self.tail {
            Some(t) => self.nodes[t].next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        self.len += 1;
    }

    pub fn pop_front(&mut self) -> Option<Vec<u8>> {
        let idx = self.head?;
        Some(self.unlink(idx))
    }

    pub fn pop_back(&mut self) -> Option<Vec<u8>> {
        let idx = self.tail?;
        Some(self.unlink(idx))
    }

    /// Element at a 0-based position from the head.
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        let idx = self.locate(index)?;
        Some(&self.nodes[idx].value)
    }

    /// Replace the element at `index`; false when out of range.
    pub fn set(&mut self, index: usize, value: Vec<u8>) -> bool {
        match self.locate(index) {
            Some(idx) => {
                self.nodes[idx].value = value;
                true
            }
            None => false,
        }
    }

    /// Elements in `[start, stop)`.
    pub fn range(&self, start: usize, stop: usize) -> Vec<Vec<u8>> {
        self.iter()
            .skip(start)
            .take(stop.saturating_sub(start))
            .map(<[u8]>::to_vec)
            .collect()
    }

    /// Remove up to `limit` elements equal to `value`, scanning from the head.
    /// A limit of 0 removes every match.
    pub fn remove_from_head(&mut self, value: &[u8], limit: usize) -> usize {
        let mut removed = 0;
        let mut cur = self.head;
        while let Some(idx) = cur {
            if limit != 0 && removed == limit {
                break;
            }
            cur = self.nodes[idx].next;
            if self.nodes[idx].value == value {
                self.unlink(idx);
                removed += 1;
            }
        }
        removed
    }

    /// Like [`remove_from_head`](Self::remove_from_head) but scanning from the tail.
    pub fn remove_from_tail(&mut self, value: &[u8], limit: usize) -> usize {
        let mut removed = 0;
        let mut cur = self.tail;
        while let Some(idx) = cur {
            if limit != 0 && removed == limit {
                break;
            }
            cur = self.nodes[idx].prev;
            if self.nodes[idx].value == value {
                self.unlink(idx);
                removed += 1;
            }
        }
        removed
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cur: self.head,
        }
    }

    /// Walk from whichever end is closer.
    fn locate(&self, index: usize) -> Option<usize> {
        if index >= self.len {
            return None;
        }
        if index <= self.len / 2 {
            let mut cur = self.head?;
            for _ in 0..index {
                cur = self.nodes[cur].next?;
            }
            Some(cur)
        } else {
            let mut cur = self.tail?;
            for _ in 0..(self.len - 1 - index) {
                cur = self.nodes[cur].prev?;
            }
            Some(cur)
        }
    }

    fn alloc(&mut self, value: Vec<u8>) -> usize {
        let node = Node {
            value,
            prev: None,
            next: None,
        };
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn unlink(&mut self, idx: usize) -> Vec<u8> {
        let Node { value, prev, next } = std::mem::take(&mut self.nodes[idx]);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.free.push(idx);
        self.len -= 1;
        value
    }
}

pub struct Iter<'a> {
    list: &'a LinkedList,
    cur: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cur?;
        let node = &self.list.nodes[idx];
        self.cur = node.next;
        Some(&node.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of(items: &[&str]) -> LinkedList {
        let mut list = LinkedList::new();
        for item in items {
            list.push_back(item.as_bytes().to_vec());
        }
        list
    }

    fn contents(list: &LinkedList) -> Vec<String> {
        list.iter()
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .collect()
    }

    #[test]
    fn test_push_pop_both_ends() {
        let mut list = LinkedList::new();
        list.push_back(b"b".to_vec());
        list.push_front(b"a".to_vec());
        list.push_back(b"c".to_vec());
        assert_eq!(contents(&list), vec!["a", "b", "c"]);
        assert_eq!(list.pop_front(), Some(b"a".to_vec()));
        assert_eq!(list.pop_back(), Some(b"c".to_vec()));
        assert_eq!(list.pop_back(), Some(b"b".to_vec()));
        assert_eq!(list.pop_back(), None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_slots_are_reused() {
        let mut list = list_of(&["a", "b"]);
        list.pop_front();
        list.push_back(b"c".to_vec());
        assert_eq!(list.nodes.len(), 2);
        assert_eq!(contents(&list), vec!["b", "c"]);
    }

    #[test]
    fn test_get_set_from_either_end() {
        let mut list = list_of(&["a", "b", "c", "d", "e"]);
        assert_eq!(list.get(0), Some(&b"a"[..]));
        assert_eq!(list.get(4), Some(&b"e"[..]));
        assert_eq!(list.get(5), None);
        assert!(list.set(3, b"D".to_vec()));
        assert!(!list.set(9, b"x".to_vec()));
        assert_eq!(contents(&list), vec!["a", "b", "c", "D", "e"]);
    }

    #[test]
    fn test_range() {
        let list = list_of(&["a", "b", "c"]);
        assert_eq!(list.range(1, 3), vec![b"b".to_vec(), b"c".to_vec()]);
        assert!(list.range(2, 1).is_empty());
    }

    #[test]
    fn test_remove_by_value() {
        let mut list = list_of(&["x", "a", "x", "b", "x"]);
        assert_eq!(list.remove_from_head(b"x", 1), 1);
        assert_eq!(contents(&list), vec!["a", "x", "b", "x"]);
        assert_eq!(list.remove_from_tail(b"x", 1), 1);
        assert_eq!(contents(&list), vec!["a", "x", "b"]);
        assert_eq!(list.remove_from_head(b"x", 0), 1);
        assert_eq!(contents(&list), vec!["a", "b"]);
        assert_eq!(list.len(), 2);
    }
}
