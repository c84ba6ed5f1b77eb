use super::border::ScoreBorder;
use rand::Rng;
use std::cmp::Ordering;

pub const MAX_LEVEL: usize = 16;
const LEVEL_PROBABILITY: f64 = 0.25;
const HEAD: usize = 0;

/// A sorted-set member together with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub member: String,
    pub score: f64,
}

impl Element {
    /// Total order used by the skiplist: score first, then member.
    fn cmp_key(&self, score: f64, member: &str) -> Ordering {
        self.score
            .total_cmp(&score)
            .then_with(|| self.member.as_str().cmp(member))
    }
}

#[derive(Debug, Clone, Default)]
struct Level {
    forward: Option<usize>,
    /// Number of level-0 steps covered by `forward`.
    span: usize,
}

#[derive(Debug, Clone)]
struct Node {
    element: Element,
    backward: Option<usize>,
    levels: Vec<Level>,
}

impl Node {
    fn new(level: usize, member: String, score: f64) -> Self {
        Node {
            element: Element { member, score },
            backward: None,
            levels: vec![Level::default(); level],
        }
    }
}

/// Skiplist ordered by `(score, member)` with span bookkeeping for rank
/// queries. Nodes are stored in an arena; slot 0 is the header.
#[derive(Debug, Clone)]
pub struct SkipList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    tail: Option<usize>,
    length: usize,
    level: usize,
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

fn random_level() -> usize {
    let mut rng = rand::thread_rng();
    let mut level = 1;
    while level < MAX_LEVEL && rng.gen_bool(LEVEL_PROBABILITY) {
        level += 1;
    }
    level
}

impl SkipList {
    pub fn new() -> Self {
        SkipList {
            nodes: vec![Node::new(MAX_LEVEL, String::new(), 0.0)],
            free: Vec::new(),
            tail: None,
            length: 0,
            level: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn forward(&self, node: usize, level: usize) -> Option<usize> {
        self.nodes[node].levels[level].forward
    }

    fn score(&self, node: usize) -> f64 {
        self.nodes[node].element.score
    }

    pub fn element(&self, node: usize) -> &Element {
        &self.nodes[node].element
    }

    pub fn first(&self) -> Option<usize> {
        self.forward(HEAD, 0)
    }

    pub fn last(&self) -> Option<usize> {
        self.tail
    }

    pub fn next(&self, node: usize) -> Option<usize> {
        self.forward(node, 0)
    }

    pub fn prev(&self, node: usize) -> Option<usize> {
        self.nodes[node].backward
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        std::iter::successors(self.first(), |n| self.next(*n)).map(|n| self.element(n))
    }

    fn alloc(&mut self, node: Node) -> usize {
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

    /// Insert a new element. The caller guarantees the member is not present.
    pub fn insert(&mut self, member: String, score: f64) -> usize {
        let mut update = [HEAD; MAX_LEVEL];
        let mut rank = [0usize; MAX_LEVEL];

        let mut x = HEAD;
        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            while let Some(next) = self.forward(x, i) {
                if self.element(next).cmp_key(score, &member) == Ordering::Less {
                    rank[i] += self.nodes[x].levels[i].span;
                    x = next;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        let level = random_level();
        if level > self.level {
            for i in self.level..level {
                rank[i] = 0;
                update[i] = HEAD;
                self.nodes[HEAD].levels[i].span = self.length;
            }
            self.level = level;
        }

        let idx = self.alloc(Node::new(level, member, score));
        for i in 0..level {
            let prev = update[i];
            let covered = rank[0] - rank[i];
            self.nodes[idx].levels[i].forward = self.nodes[prev].levels[i].forward;
            self.nodes[idx].levels[i].span = self.nodes[prev].levels[i].span - covered;
            self.nodes[prev].levels[i].forward = Some(idx);
            self.nodes[prev].levels[i].span = covered + 1;
        }
        // Levels above the new node now skip one more element.
        for i in level..self.level {
            self.nodes[update[i]].levels[i].span += 1;
        }

        self.nodes[idx].backward = (update[0] != HEAD).then_some(update[0]);
        match self.forward(idx, 0) {
            Some(next) => self.nodes[next].backward = Some(idx),
            None => self.tail = Some(idx),
        }
        self.length += 1;
        idx
    }

    fn unlink(&mut self, node: usize, update: &[usize; MAX_LEVEL]) -> Element {
        for i in 0..self.level {
            let prev = update[i];
            if self.forward(prev, i) == Some(node) {
                let span = self.nodes[node].levels[i].span;
                self.nodes[prev].levels[i].span += span;
                self.nodes[prev].levels[i].span -= 1;
                self.nodes[prev].levels[i].forward = self.nodes[node].levels[i].forward;
            } else {
                self.nodes[prev].levels[i].span -= 1;
            }
        }

        let backward = self.nodes[node].backward;
        match self.forward(node, 0) {
            Some(next) => self.nodes[next].backward = backward,
            None => self.tail = backward,
        }
        while self.level > 1 && self.forward(HEAD, self.level - 1).is_none() {
            self.level -= 1;
        }
        self.length -= 1;
        self.free.push(node);

        let freed = &mut self.nodes[node];
        freed.levels.clear();
        freed.backward = None;
        std::mem::replace(
            &mut freed.element,
            Element {
                member: String::new(),
                score: 0.0,
            },
        )
    }

    /// Remove the element with exactly this member and score.
    pub fn remove(&mut self, member: &str, score: f64) -> bool {
        let mut update = [HEAD; MAX_LEVEL];
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if self.element(next).cmp_key(score, member) == Ordering::Less {
                    x = next;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        match self.forward(x, 0) {
            Some(target) if self.element(target).cmp_key(score, member) == Ordering::Equal => {
                self.unlink(target, &update);
                true
            }
            _ => false,
        }
    }

    /// 0-based rank of the element, or `None` when it is not in the list.
    pub fn get_rank(&self, member: &str, score: f64) -> Option<usize> {
        let mut rank = 0;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if self.element(next).cmp_key(score, member) != Ordering::Greater {
                    rank += self.nodes[x].levels[i].span;
                    x = next;
                } else {
                    break;
                }
            }
            if x != HEAD && self.element(x).cmp_key(score, member) == Ordering::Equal {
                return Some(rank - 1);
            }
        }
        None
    }

    /// Node at a 0-based rank.
    pub fn get_by_rank(&self, rank: usize) -> Option<usize> {
        let target = rank + 1;
        let mut traversed = 0;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                let span = self.nodes[x].levels[i].span;
                if traversed + span <= target {
                    traversed += span;
                    x = next;
                } else {
                    break;
                }
            }
            if traversed == target {
                return Some(x);
            }
        }
        None
    }

    /// Cheap check whether any element can fall between the borders.
    pub fn has_in_range(&self, min: &ScoreBorder, max: &ScoreBorder) -> bool {
        if ScoreBorder::is_empty_interval(min, max) {
            return false;
        }
        let (Some(first), Some(last)) = (self.first(), self.tail) else {
            return false;
        };
        min.less(self.score(last)) && max.greater(self.score(first))
    }

    /// Lowest-ranked node whose score lies within the borders.
    pub fn first_in_range(&self, min: &ScoreBorder, max: &ScoreBorder) -> Option<usize> {
        if !self.has_in_range(min, max) {
            return None;
        }
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if !min.less(self.score(next)) {
                    x = next;
                } else {
                    break;
                }
            }
        }
        let candidate = self.forward(x, 0)?;
        max.greater(self.score(candidate)).then_some(candidate)
    }

    /// Highest-ranked node whose score lies within the borders.
    pub fn last_in_range(&self, min: &ScoreBorder, max: &ScoreBorder) -> Option<usize> {
        if !self.has_in_range(min, max) {
            return None;
        }
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if max.greater(self.score(next)) {
                    x = next;
                } else {
                    break;
                }
            }
        }
        (x != HEAD && min.less(self.score(x))).then_some(x)
    }

    /// Remove every element with a score between the borders.
    pub fn remove_range_by_score(&mut self, min: &ScoreBorder, max: &ScoreBorder) -> Vec<Element> {
        let mut removed = Vec::new();
        if !self.has_in_range(min, max) {
            return removed;
        }

        let mut update = [HEAD; MAX_LEVEL];
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                if !min.less(self.score(next)) {
                    x = next;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        let mut cur = self.forward(x, 0);
        while let Some(node) = cur {
            if !max.greater(self.score(node)) {
                break;
            }
            cur = self.forward(node, 0);
            removed.push(self.unlink(node, &update));
        }
        removed
    }

    /// Remove elements with 0-based ranks in `[start, stop)`.
    pub fn remove_range_by_rank(&mut self, start: usize, stop: usize) -> Vec<Element> {
        let mut removed = Vec::new();
        if start >= stop {
            return removed;
        }

        let mut update = [HEAD; MAX_LEVEL];
        let mut traversed = 0;
        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward(x, i) {
                let span = self.nodes[x].levels[i].span;
                if traversed + span <= start {
                    traversed += span;
                    x = next;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        let mut cur = self.forward(x, 0);
        while let Some(node) = cur {
            if traversed >= stop {
                break;
            }
            cur = self.forward(node, 0);
            removed.push(self.unlink(node, &update));
            traversed += 1;
        }
        removed
    }
}
