use std::collections::BTreeMap;

use rustc_hash::FxHashSet;

use crate::WorkloadRecord;

/// Outcome of diffing the previously materialized partition set against the
/// set wanted now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
}

/// `added = current \ previous`, `removed = previous \ current`.
/// Duplicates collapse; comparison is exact, case-sensitive string match.
pub fn partition_diff(previous: &[String], current: &[String]) -> PartitionDiff {
    let prev: FxHashSet<&str> = previous.iter().map(|s| s.as_str()).collect();
    let cur: FxHashSet<&str> = current.iter().map(|s| s.as_str()).collect();
    let mut diff = PartitionDiff::default();
    let mut seen = FxHashSet::default();
    for name in current {
        if !seen.insert(name.as_str()) {
            continue;
        }
        if !prev.contains(name.as_str()) {
            diff.added.push(name.clone());
        }
    }
    seen.clear();
    for name in previous {
        if !seen.insert(name.as_str()) {
            continue;
        }
        if cur.contains(name.as_str()) {
            diff.unchanged.push(name.clone());
        } else {
            diff.removed.push(name.clone());
        }
    }
    diff
}

/// Group records by namespace, sorted by name within each group.
///
/// Both orderings matter: the BTreeMap keeps the partition walk
/// deterministic, and the per-group sort pins each workload to a stable row
/// so a user-entered desired value keeps pointing at the same workload
/// across renders.
pub fn group_by_namespace(records: Vec<WorkloadRecord>) -> BTreeMap<String, Vec<WorkloadRecord>> {
    let mut by_ns: BTreeMap<String, Vec<WorkloadRecord>> = BTreeMap::new();
    for r in records {
        by_ns.entry(r.namespace.clone()).or_default().push(r);
    }
    for group in by_ns.values_mut() {
        group.sort_by(|a, b| a.name.cmp(&b.name));
    }
    by_ns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn diff_partitions_by_set_difference() {
        let d = partition_diff(&names(&["Sheet1", "team-a", "team-b"]), &names(&["Sheet1", "team-b", "team-c"]));
        assert_eq!(d.added, names(&["team-c"]));
        assert_eq!(d.removed, names(&["team-a"]));
        assert_eq!(d.unchanged, names(&["Sheet1", "team-b"]));
    }

    #[test]
    fn added_and_removed_are_disjoint_and_dedup() {
        let d = partition_diff(&names(&["a", "a", "b"]), &names(&["b", "c", "c"]));
        assert_eq!(d.added, names(&["c"]));
        assert_eq!(d.removed, names(&["a"]));
        for a in &d.added {
            assert!(!d.removed.contains(a));
        }
    }

    #[test]
    fn diff_is_case_sensitive() {
        let d = partition_diff(&names(&["Team-A"]), &names(&["team-a"]));
        assert_eq!(d.added, names(&["team-a"]));
        assert_eq!(d.removed, names(&["Team-A"]));
    }

    #[test]
    fn grouping_sorts_within_namespace() {
        let recs = vec![
            WorkloadRecord { name: "web".into(), namespace: "team-a".into(), declared_replicas: 1 },
            WorkloadRecord { name: "api".into(), namespace: "team-a".into(), declared_replicas: 2 },
            WorkloadRecord { name: "db".into(), namespace: "team-b".into(), declared_replicas: 1 },
        ];
        let by_ns = group_by_namespace(recs);
        assert_eq!(by_ns.keys().cloned().collect::<Vec<_>>(), names(&["team-a", "team-b"]));
        let team_a: Vec<_> = by_ns["team-a"].iter().map(|r| r.name.as_str()).collect();
        assert_eq!(team_a, vec!["api", "web"]);
    }
}
