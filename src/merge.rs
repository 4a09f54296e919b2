//! Guaranteed-coverage merges.
//!
//! Both merges take items partitioned into groups (one subreddit, one feed
//! author, ...) and produce a single list in which every non-empty group is
//! represented at least once, with the remaining capacity going to the best
//! items overall. Group order is always passed explicitly so output never
//! depends on hash-map iteration order.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

/// Minimum size of a score-ranked merge.
pub const SCORE_FLOOR: usize = 5;

/// Default size of a recency-ranked merge.
pub const RECENCY_LIMIT: usize = 5;

/// Default trailing window for recency-ranked content.
pub fn recency_window() -> Duration {
    Duration::hours(24)
}

pub trait RankedItem {
    type Rank: Ord + Copy;

    /// Sub-source the item belongs to.
    fn group_key(&self) -> &str;

    /// Higher ranks sort first.
    fn rank_value(&self) -> Self::Rank;

    /// Identifies the item within one merge pass.
    fn dedup_key(&self) -> &str;
}

pub trait TimedItem: RankedItem {
    fn timestamp(&self) -> Option<DateTime<Utc>>;
}

/// Per-group item lists plus the order the groups were registered in.
#[derive(Debug, Clone)]
pub struct MergeInput<T> {
    groups: HashMap<String, Vec<T>>,
    order: Vec<String>,
}

impl<T> Default for MergeInput<T> {
    fn default() -> Self {
        Self {
            groups: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T> MergeInput<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group. Pushing an existing key appends to it without changing
    /// its position.
    pub fn push_group(&mut self, key: impl Into<String>, items: Vec<T>) {
        let key = key.into();
        match self.groups.get_mut(&key) {
            Some(existing) => existing.extend(items),
            None => {
                self.order.push(key.clone());
                self.groups.insert(key, items);
            }
        }
    }

    pub fn groups(&self) -> &HashMap<String, Vec<T>> {
        &self.groups
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn non_empty_groups(&self) -> usize {
        self.order
            .iter()
            .filter(|k| self.groups.get(*k).is_some_and(|items| !items.is_empty()))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.non_empty_groups() == 0
    }
}

impl<T: RankedItem + Clone> MergeInput<T> {
    pub fn merge_by_score(&self, floor: usize) -> Vec<T> {
        merge_by_score(&self.groups, &self.order, floor)
    }
}

impl<T: TimedItem + Clone> MergeInput<T> {
    pub fn merge_by_recency(&self, window: Duration, limit: usize, now: DateTime<Utc>) -> Vec<T> {
        merge_by_recency(&self.groups, &self.order, window, limit, now)
    }
}

fn sort_descending<T: RankedItem>(items: &mut [T]) {
    // stable: equal ranks keep their relative order
    items.sort_by(|a, b| b.rank_value().cmp(&a.rank_value()));
}

/// Score-ranked merge.
///
/// Takes each group's first item as its guaranteed entry, then fills up to
/// `max(non-empty groups, floor)` with the highest-ranked remaining items.
pub fn merge_by_score<T>(groups: &HashMap<String, Vec<T>>, order: &[String], floor: usize) -> Vec<T>
where
    T: RankedItem + Clone,
{
    let mut used: HashSet<&str> = HashSet::new();
    let mut guaranteed: Vec<T> = Vec::new();
    let mut non_empty = 0;

    for key in order {
        let Some(items) = groups.get(key) else {
            continue;
        };
        if items.is_empty() {
            continue;
        }
        non_empty += 1;
        if let Some(first) = items.iter().find(|i| !used.contains(i.dedup_key())) {
            used.insert(first.dedup_key());
            guaranteed.push(first.clone());
        }
    }

    let target = non_empty.max(floor);

    if guaranteed.len() >= target {
        sort_descending(&mut guaranteed);
        return guaranteed;
    }

    let mut remaining: Vec<T> = Vec::new();
    for key in order {
        for item in groups.get(key).into_iter().flatten() {
            if used.insert(item.dedup_key()) {
                remaining.push(item.clone());
            }
        }
    }
    sort_descending(&mut remaining);

    let spots_left = target - guaranteed.len();
    let mut result = guaranteed;
    result.extend(remaining.into_iter().take(spots_left));
    sort_descending(&mut result);
    result
}

/// Recency-ranked merge over a trailing time window.
///
/// Items without a timestamp, or older than `window` relative to `now`, are
/// dropped before anything else happens. Unlike [`merge_by_score`] the size
/// is an explicit `limit`; the result may exceed it only to keep every group
/// represented.
pub fn merge_by_recency<T>(
    groups: &HashMap<String, Vec<T>>,
    order: &[String],
    window: Duration,
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<T>
where
    T: TimedItem + Clone,
{
    let cutoff = now - window;

    let mut seen: HashSet<&str> = HashSet::new();
    let mut pool: Vec<&T> = Vec::new();
    for key in order {
        for item in groups.get(key).into_iter().flatten() {
            let in_window = item.timestamp().is_some_and(|ts| ts > cutoff);
            if in_window && seen.insert(item.dedup_key()) {
                pool.push(item);
            }
        }
    }
    pool.sort_by(|a, b| b.rank_value().cmp(&a.rank_value()));

    // Most recent surviving item per group, in recency order
    let mut covered: HashSet<&str> = HashSet::new();
    let guaranteed: Vec<&T> = pool
        .iter()
        .copied()
        .filter(|item| covered.insert(item.group_key()))
        .collect();

    if guaranteed.len() >= limit {
        return guaranteed.into_iter().cloned().collect();
    }

    let mut result: Vec<&T> = pool.iter().copied().take(limit).collect();

    let mut included: HashSet<&str> = result.iter().map(|item| item.group_key()).collect();
    for key in order {
        if included.contains(key.as_str()) {
            continue;
        }
        if let Some(item) = guaranteed.iter().find(|item| item.group_key() == key.as_str()) {
            result.push(*item);
            included.insert(key.as_str());
        }
    }

    let mut result: Vec<T> = result.into_iter().cloned().collect();
    sort_descending(&mut result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Scored {
        group: String,
        score: i64,
        key: String,
    }

    impl RankedItem for Scored {
        type Rank = i64;

        fn group_key(&self) -> &str {
            &self.group
        }

        fn rank_value(&self) -> i64 {
            self.score
        }

        fn dedup_key(&self) -> &str {
            &self.key
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Timed {
        group: String,
        at: Option<DateTime<Utc>>,
        key: String,
    }

    impl RankedItem for Timed {
        type Rank = Option<DateTime<Utc>>;

        fn group_key(&self) -> &str {
            &self.group
        }

        fn rank_value(&self) -> Self::Rank {
            self.at
        }

        fn dedup_key(&self) -> &str {
            &self.key
        }
    }

    impl TimedItem for Timed {
        fn timestamp(&self) -> Option<DateTime<Utc>> {
            self.at
        }
    }

    fn scored(group: &str, score: i64) -> Scored {
        Scored {
            group: group.to_string(),
            score,
            key: format!("/{}/{}", group, score),
        }
    }

    fn score_input(groups: &[(&str, Vec<i64>)]) -> MergeInput<Scored> {
        let mut input = MergeInput::new();
        for (group, scores) in groups {
            input.push_group(*group, scores.iter().map(|s| scored(group, *s)).collect());
        }
        input
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn timed(group: &str, hours_ago: i64, key: &str) -> Timed {
        Timed {
            group: group.to_string(),
            at: Some(now() - Duration::hours(hours_ago)),
            key: key.to_string(),
        }
    }

    fn recency_input(items: Vec<Timed>) -> MergeInput<Timed> {
        let mut input = MergeInput::new();
        for item in items {
            let group = item.group.clone();
            input.push_group(group, vec![item]);
        }
        input
    }

    fn is_descending<T: RankedItem>(items: &[T]) -> bool {
        items.windows(2).all(|w| w[0].rank_value() >= w[1].rank_value())
    }

    mod merge_input_tests {
        use super::*;

        #[test]
        fn test_push_group_keeps_first_position() {
            let mut input = MergeInput::new();
            input.push_group("b", vec![scored("b", 1)]);
            input.push_group("a", vec![scored("a", 1)]);
            input.push_group("b", vec![scored("b", 2)]);

            assert_eq!(input.order(), &["b".to_string(), "a".to_string()]);
            assert_eq!(input.groups()["b"].len(), 2);
        }

        #[test]
        fn test_non_empty_groups() {
            let input = score_input(&[("a", vec![1]), ("b", vec![]), ("c", vec![2, 3])]);
            assert_eq!(input.non_empty_groups(), 2);
            assert!(!input.is_empty());
            assert!(score_input(&[("a", vec![])]).is_empty());
        }
    }

    mod score_tests {
        use super::*;

        #[test]
        fn test_three_groups_scenario() {
            let input = score_input(&[("a", vec![100, 80, 60]), ("b", vec![90, 70]), ("c", vec![10])]);

            let result = input.merge_by_score(SCORE_FLOOR);

            assert_eq!(result.len(), 5);
            assert!(result.iter().any(|p| p.group == "c"));
            let scores: Vec<i64> = result.iter().map(|p| p.score).collect();
            assert_eq!(scores, vec![100, 90, 80, 70, 10]);
        }

        #[test]
        fn test_low_score_group_is_guaranteed() {
            let input = score_input(&[
                ("popular", vec![10000, 9000, 8000, 7000, 6000]),
                ("niche", vec![5]),
            ]);

            let result = input.merge_by_score(SCORE_FLOOR);

            assert_eq!(result.len(), 5);
            assert!(result.iter().any(|p| p.group == "niche"));
            assert!(!result.iter().any(|p| p.score == 6000));
        }

        #[test]
        fn test_length_is_min_of_available_and_target() {
            let cases: Vec<(Vec<(&str, Vec<i64>)>, usize)> = vec![
                (vec![("a", vec![3, 2])], 2),
                (vec![("a", vec![5, 4, 3, 2, 1, 0])], 5),
                (vec![("a", vec![1]), ("b", vec![2]), ("c", vec![3])], 3),
                (
                    vec![
                        ("a", vec![1, 1]),
                        ("b", vec![2]),
                        ("c", vec![3]),
                        ("d", vec![4]),
                        ("e", vec![5]),
                        ("f", vec![6]),
                        ("g", vec![7]),
                    ],
                    7,
                ),
            ];

            for (groups, expected) in cases {
                let input = score_input(&groups);
                assert_eq!(input.merge_by_score(SCORE_FLOOR).len(), expected, "{:?}", groups);
            }
        }

        #[test]
        fn test_more_groups_than_floor_returns_one_per_group() {
            let groups: Vec<(&str, Vec<i64>)> = vec![
                ("a", vec![10, 9]),
                ("b", vec![20, 19]),
                ("c", vec![30]),
                ("d", vec![40]),
                ("e", vec![50]),
                ("f", vec![60]),
            ];
            let result = score_input(&groups).merge_by_score(SCORE_FLOOR);

            assert_eq!(result.len(), 6);
            let scores: Vec<i64> = result.iter().map(|p| p.score).collect();
            assert_eq!(scores, vec![60, 50, 40, 30, 20, 10]);
        }

        #[test]
        fn test_every_group_represented() {
            let input = score_input(&[
                ("a", vec![500, 400, 300]),
                ("b", vec![450, 350]),
                ("c", vec![1]),
                ("d", vec![2]),
            ]);

            let result = input.merge_by_score(SCORE_FLOOR);

            for group in ["a", "b", "c", "d"] {
                assert!(result.iter().any(|p| p.group == group), "missing {}", group);
            }
            assert!(is_descending(&result));
        }

        #[test]
        fn test_ties_preserve_input_order() {
            let mut input = MergeInput::new();
            input.push_group(
                "a",
                vec![
                    Scored { group: "a".into(), score: 50, key: "a1".into() },
                    Scored { group: "a".into(), score: 50, key: "a2".into() },
                ],
            );
            input.push_group(
                "b",
                vec![Scored { group: "b".into(), score: 50, key: "b1".into() }],
            );

            let result = input.merge_by_score(SCORE_FLOOR);
            let keys: Vec<&str> = result.iter().map(|p| p.key.as_str()).collect();
            assert_eq!(keys, vec!["a1", "b1", "a2"]);
        }

        #[test]
        fn test_idempotent_when_remerged_as_single_group() {
            let input = score_input(&[("a", vec![100, 80, 60]), ("b", vec![90, 70]), ("c", vec![10])]);
            let first = input.merge_by_score(SCORE_FLOOR);

            let mut again = MergeInput::new();
            again.push_group("all", first.clone());
            let second = again.merge_by_score(SCORE_FLOOR);

            assert_eq!(first, second);
        }

        #[test]
        fn test_duplicates_across_groups_appear_once() {
            let shared = Scored { group: "a".into(), score: 99, key: "/shared".into() };
            let mut input = MergeInput::new();
            input.push_group("a", vec![shared.clone(), scored("a", 10)]);
            input.push_group(
                "b",
                vec![Scored { group: "b".into(), ..shared }, scored("b", 20)],
            );

            let result = input.merge_by_score(SCORE_FLOOR);

            assert_eq!(result.iter().filter(|p| p.key == "/shared").count(), 1);
            assert!(result.iter().any(|p| p.group == "b"));
            assert_eq!(result.len(), 3);
        }

        #[test]
        fn test_empty_input() {
            let input: MergeInput<Scored> = MergeInput::new();
            assert!(input.merge_by_score(SCORE_FLOOR).is_empty());
        }

        #[test]
        fn test_all_groups_empty() {
            let input = score_input(&[("a", vec![]), ("b", vec![])]);
            assert!(input.merge_by_score(SCORE_FLOOR).is_empty());
        }

        #[test]
        fn test_order_keys_missing_from_map_are_skipped() {
            let mut groups = HashMap::new();
            groups.insert("a".to_string(), vec![scored("a", 1)]);
            let order = vec!["ghost".to_string(), "a".to_string()];

            let result = merge_by_score(&groups, &order, SCORE_FLOOR);
            assert_eq!(result.len(), 1);
        }
    }

    mod recency_tests {
        use super::*;

        #[test]
        fn test_drops_items_outside_window_and_undated() {
            let mut input = recency_input(vec![
                timed("alice", 1, "a1"),
                timed("alice", 30, "a-old"),
                timed("bob", 25, "b-old"),
            ]);
            input.push_group(
                "carol",
                vec![Timed { group: "carol".into(), at: None, key: "c-undated".into() }],
            );

            let result = input.merge_by_recency(recency_window(), 100, now());

            let keys: Vec<&str> = result.iter().map(|p| p.key.as_str()).collect();
            assert_eq!(keys, vec!["a1"]);
        }

        #[test]
        fn test_fills_by_recency_up_to_limit() {
            let input = recency_input(vec![
                timed("alice", 1, "a1"),
                timed("alice", 2, "a2"),
                timed("alice", 3, "a3"),
                timed("bob", 4, "b1"),
                timed("alice", 5, "a4"),
                timed("alice", 6, "a5"),
            ]);

            let result = input.merge_by_recency(recency_window(), 5, now());

            let keys: Vec<&str> = result.iter().map(|p| p.key.as_str()).collect();
            assert_eq!(keys, vec!["a1", "a2", "a3", "b1", "a4"]);
        }

        #[test]
        fn test_force_inserts_missing_group_above_limit() {
            let input = recency_input(vec![
                timed("alice", 1, "a1"),
                timed("alice", 2, "a2"),
                timed("bob", 3, "b1"),
                timed("alice", 4, "a3"),
                timed("carol", 20, "c1"),
            ]);

            let result = input.merge_by_recency(recency_window(), 4, now());

            let keys: Vec<&str> = result.iter().map(|p| p.key.as_str()).collect();
            assert_eq!(keys, vec!["a1", "a2", "b1", "a3", "c1"]);
        }

        #[test]
        fn test_guaranteed_alone_meets_limit() {
            let input = recency_input(vec![
                timed("alice", 5, "a1"),
                timed("alice", 1, "a0"),
                timed("bob", 3, "b1"),
                timed("carol", 2, "c1"),
            ]);

            let result = input.merge_by_recency(recency_window(), 2, now());

            let keys: Vec<&str> = result.iter().map(|p| p.key.as_str()).collect();
            assert_eq!(keys, vec!["a0", "c1", "b1"]);
        }

        #[test]
        fn test_future_dated_items_are_kept() {
            let input = recency_input(vec![timed("alice", -2, "future"), timed("alice", 1, "a1")]);

            let result = input.merge_by_recency(recency_window(), 5, now());
            assert_eq!(result[0].key, "future");
            assert_eq!(result.len(), 2);
        }

        #[test]
        fn test_window_drops_regardless_of_limit() {
            let input = recency_input(vec![timed("alice", 48, "a1"), timed("bob", 24, "b1")]);

            for limit in [0, 1, 5, 50] {
                assert!(input.merge_by_recency(recency_window(), limit, now()).is_empty());
            }
        }

        #[test]
        fn test_duplicate_links_appear_once() {
            let input = recency_input(vec![timed("alice", 1, "same"), timed("bob", 2, "same")]);

            let result = input.merge_by_recency(recency_window(), 5, now());
            assert_eq!(result.len(), 1);
        }

        #[test]
        fn test_result_sorted_most_recent_first() {
            let input = recency_input(vec![
                timed("bob", 7, "b1"),
                timed("alice", 3, "a1"),
                timed("carol", 12, "c1"),
                timed("alice", 1, "a2"),
            ]);

            let result = input.merge_by_recency(recency_window(), 3, now());
            assert!(is_descending(&result));
            for group in ["alice", "bob", "carol"] {
                assert!(result.iter().any(|p| p.group == group));
            }
        }
    }
}
