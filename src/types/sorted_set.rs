use super::border::ScoreBorder;
use super::skiplist::{Element, SkipList};
use std::collections::HashMap;

/// Sorted set: a member -> score map for point lookups, plus a skiplist
/// ordered by `(score, member)` for ranks and ranges. Both are always
/// updated together.
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    scores: HashMap<String, f64>,
    list: SkipList,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Add or update a member. Returns true only for a new member.
    pub fn add(&mut self, member: String, score: f64) -> bool {
        match self.scores.get(&member).copied() {
            Some(old) if old == score => false,
            Some(old) => {
                self.list.remove(&member, old);
                self.scores.insert(member.clone(), score);
                self.list.insert(member, score);
                false
            }
            None => {
                self.scores.insert(member.clone(), score);
                self.list.insert(member, score);
                true
            }
        }
    }

    pub fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.list.remove(member, score);
                true
            }
            None => false,
        }
    }

    pub fn score(&self, member: &str) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// 0-based rank, counted from the highest score when `desc` is set.
    pub fn rank(&self, member: &str, desc: bool) -> Option<usize> {
        let score = self.score(member)?;
        let rank = self.list.get_rank(member, score)?;
        Some(if desc { self.len() - 1 - rank } else { rank })
    }

    /// Elements with 0-based ranks in `[start, stop)`.
    pub fn range(&self, start: usize, stop: usize, desc: bool) -> Vec<Element> {
        let stop = stop.min(self.len());
        if start >= stop {
            return Vec::new();
        }

        let anchor = if desc {
            self.list.get_by_rank(self.len() - 1 - start)
        } else {
            self.list.get_by_rank(start)
        };
        self.walk(anchor, desc)
            .take(stop - start)
            .cloned()
            .collect()
    }

    pub fn count(&self, min: &ScoreBorder, max: &ScoreBorder) -> usize {
        let (Some(first), Some(last)) = (
            self.list.first_in_range(min, max),
            self.list.last_in_range(min, max),
        ) else {
            return 0;
        };
        let rank_of = |node| {
            let e = self.list.element(node);
            self.list.get_rank(&e.member, e.score).unwrap_or(0)
        };
        rank_of(last) + 1 - rank_of(first)
    }

    /// Elements with scores between the borders, skipping `offset` and
    /// returning at most `limit` (a negative limit means no limit).
    pub fn range_by_score(
        &self,
        min: &ScoreBorder,
        max: &ScoreBorder,
        offset: usize,
        limit: i64,
        desc: bool,
    ) -> Vec<Element> {
        let anchor = if desc {
            self.list.last_in_range(min, max)
        } else {
            self.list.first_in_range(min, max)
        };
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        self.walk(anchor, desc)
            .skip(offset)
            .take_while(|e| min.less(e.score) && max.greater(e.score))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn remove_by_score(&mut self, min: &ScoreBorder, max: &ScoreBorder) -> usize {
        let removed = self.list.remove_range_by_score(min, max);
        for e in &removed {
            self.scores.remove(&e.member);
        }
        removed.len()
    }

    /// Remove elements with 0-based ranks in `[start, stop)`.
    pub fn remove_by_rank(&mut self, start: usize, stop: usize) -> usize {
        let removed = self.list.remove_range_by_rank(start, stop);
        for e in &removed {
            self.scores.remove(&e.member);
        }
        removed.len()
    }

    fn walk(&self, from: Option<usize>, desc: bool) -> impl Iterator<Item = &Element> {
        std::iter::successors(from, move |n| {
            if desc {
                self.list.prev(*n)
            } else {
                self.list.next(*n)
            }
        })
        .map(|n| self.list.element(n))
    }
}
