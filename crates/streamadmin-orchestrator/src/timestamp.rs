//! Timestamp arithmetic.
//!
//! Pure functions over [`PartitionTimestamp`]s. Worker retry loops call these
//! repeatedly, so none of them touch I/O or mutate their inputs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use streamadmin_common::protocol::{PartitionEntry, PartitionTimestamp};

/// Partitions a round must leave active, per bucket.
pub type ExpectedPartitions = BTreeMap<String, BTreeSet<u16>>;

/// Copies a caller-supplied timestamp into `pool`, one entry per partition.
pub fn restart_timestamp_from_request(pool: &str, requested: &PartitionTimestamp) -> PartitionTimestamp {
    let mut ts = PartitionTimestamp::with_capacity(pool, requested.bucket.clone(), requested.len());
    for entry in requested.entries() {
        ts.upsert(*entry);
    }
    ts
}

/// Rebuilds `requested` with the producer's proposed rollback position for
/// every partition that has one. Other partitions keep their original entry
/// and the entry order is preserved.
pub fn recompute_request_timestamp(
    requested: &PartitionTimestamp,
    rollbacks: &[PartitionTimestamp],
) -> PartitionTimestamp {
    let rollback = find_timestamp_for_bucket(rollbacks, &requested.bucket);

    let mut ts = PartitionTimestamp::with_capacity(
        requested.pool.clone(),
        requested.bucket.clone(),
        requested.len(),
    );
    for entry in requested.entries() {
        let chosen = rollback
            .and_then(|rb| find_partition_offset(rb, entry.partition).map(|i| rb.entries()[i]))
            .unwrap_or(*entry);
        ts.upsert(chosen);
    }
    ts
}

/// Whether a rollback proposal respects history: it may not move a partition
/// forward on the same branch.
pub fn is_consistent_rollback(requested: &PartitionEntry, rollback: &PartitionEntry) -> bool {
    rollback.vbuuid != requested.vbuuid || rollback.seqno <= requested.seqno
}

pub fn find_timestamp_for_bucket<'a>(
    timestamps: &'a [PartitionTimestamp],
    bucket: &str,
) -> Option<&'a PartitionTimestamp> {
    timestamps.iter().find(|ts| ts.bucket == bucket)
}

/// Offset of `partition` within the entries of `ts`.
pub fn find_partition_offset(ts: &PartitionTimestamp, partition: u16) -> Option<usize> {
    ts.entries().iter().position(|e| e.partition == partition)
}

/// The subset of `ts` whose partitions satisfy `keep`, or `None` if nothing
/// is left.
pub fn retain_partitions(
    ts: &PartitionTimestamp,
    mut keep: impl FnMut(u16) -> bool,
) -> Option<PartitionTimestamp> {
    let mut out = PartitionTimestamp::new(ts.pool.clone(), ts.bucket.clone());
    for entry in ts.entries().iter().filter(|e| keep(e.partition)) {
        out.upsert(*entry);
    }
    (!out.is_empty()).then_some(out)
}

/// Partitions covered by a list of timestamps.
pub fn expected_from_timestamps(timestamps: &[PartitionTimestamp]) -> ExpectedPartitions {
    let mut expected = ExpectedPartitions::new();
    for ts in timestamps {
        expected.entry(ts.bucket.clone()).or_default().extend(ts.partitions());
    }
    expected
}

/// Partitions an add must activate: those of the caller's timestamp for a
/// bucket when one was given, otherwise every partition of the bucket.
pub fn expected_for_add(
    buckets: &[String],
    requested: &[PartitionTimestamp],
    num_partitions: u16,
) -> ExpectedPartitions {
    buckets
        .iter()
        .map(|bucket| {
            let partitions = match find_timestamp_for_bucket(requested, bucket) {
                Some(ts) => ts.partitions().collect(),
                None => (0..num_partitions).collect(),
            };
            (bucket.clone(), partitions)
        })
        .collect()
}

/// A partition reported active by more than one producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOwnership {
    pub bucket: String,
    pub partition: u16,
    pub nodes: Vec<String>,
}

/// Result of checking reported active partitions against the expected set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coverage {
    /// Expected partitions no producer reported active.
    pub missing: Vec<(String, u16)>,
    pub split: Vec<SplitOwnership>,
}

impl Coverage {
    /// Every expected partition is active on exactly one producer.
    pub fn is_exclusive(&self) -> bool {
        self.missing.is_empty() && self.split.is_empty()
    }
}

/// Counts, for every expected `(bucket, partition)`, the active timestamps
/// covering it. Claims outside the expected set are ignored.
pub fn check_coverage<'a>(
    expected: &ExpectedPartitions,
    claims: impl IntoIterator<Item = (&'a str, &'a PartitionTimestamp)>,
) -> Coverage {
    let mut owners: HashMap<(&str, u16), Vec<&str>> = HashMap::new();
    for (node, ts) in claims {
        let Some(partitions) = expected.get(&ts.bucket) else {
            continue;
        };
        for partition in ts.partitions().filter(|p| partitions.contains(p)) {
            owners.entry((ts.bucket.as_str(), partition)).or_default().push(node);
        }
    }

    let mut coverage = Coverage::default();
    for (bucket, partitions) in expected {
        for &partition in partitions {
            match owners.get(&(bucket.as_str(), partition)) {
                None => coverage.missing.push((bucket.clone(), partition)),
                Some(nodes) if nodes.len() > 1 => coverage.split.push(SplitOwnership {
                    bucket: bucket.clone(),
                    partition,
                    nodes: nodes.iter().map(|n| n.to_string()).collect(),
                }),
                Some(_) => {}
            }
        }
    }
    coverage
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamadmin_common::protocol::DEFAULT_POOL_NAME;

    fn ts(bucket: &str, entries: &[(u16, u64, u64)]) -> PartitionTimestamp {
        PartitionTimestamp::from_entries(
            DEFAULT_POOL_NAME,
            bucket,
            entries
                .iter()
                .map(|&(p, seqno, vbuuid)| PartitionEntry::new(p, seqno, vbuuid, seqno, seqno)),
        )
        .unwrap()
    }

    #[test]
    fn test_restart_timestamp_copies_every_entry() {
        let requested = ts("b", &[(3, 30, 1), (1, 10, 1)]);
        let copied = restart_timestamp_from_request("pool-a", &requested);

        assert_eq!(copied.pool, "pool-a");
        assert_eq!(copied.bucket, "b");
        assert_eq!(copied.entries(), requested.entries());
    }

    #[test]
    fn test_recompute_substitutes_rollback_only() {
        let requested = ts("b", &[(5, 150, 9), (7, 150, 9), (9, 150, 9)]);
        let rollback = ts("b", &[(7, 100, 9)]);

        let recomputed = recompute_request_timestamp(&requested, &[rollback]);

        assert_eq!(recomputed.partitions().collect::<Vec<_>>(), vec![5, 7, 9]);
        assert_eq!(recomputed.get(7).unwrap().seqno, 100);
        assert_eq!(recomputed.get(5), requested.get(5));
        assert_eq!(recomputed.get(9), requested.get(9));
        // input untouched
        assert_eq!(requested.get(7).unwrap().seqno, 150);
    }

    #[test]
    fn test_recompute_ignores_other_buckets_and_unknown_partitions() {
        let requested = ts("b", &[(1, 50, 2)]);
        let rollbacks = vec![ts("other", &[(1, 0, 2)]), ts("b", &[(2, 0, 2)])];

        let recomputed = recompute_request_timestamp(&requested, &rollbacks);
        assert_eq!(recomputed, requested);
    }

    #[test]
    fn test_recompute_without_rollbacks_is_identity() {
        let requested = ts("b", &[(0, 1, 1), (1, 2, 1)]);
        assert_eq!(recompute_request_timestamp(&requested, &[]), requested);
    }

    #[test]
    fn test_rollback_consistency() {
        let requested = PartitionEntry::new(7, 150, 9, 150, 150);
        assert!(is_consistent_rollback(&requested, &PartitionEntry::new(7, 100, 9, 100, 100)));
        assert!(!is_consistent_rollback(&requested, &PartitionEntry::new(7, 200, 9, 200, 200)));
        // new branch, seqnos are not comparable
        assert!(is_consistent_rollback(&requested, &PartitionEntry::new(7, 200, 4, 200, 200)));
    }

    #[test]
    fn test_find_helpers() {
        let list = vec![ts("a", &[(0, 1, 1)]), ts("b", &[(4, 1, 1), (2, 1, 1)])];

        assert_eq!(find_timestamp_for_bucket(&list, "b").unwrap().bucket, "b");
        assert!(find_timestamp_for_bucket(&list, "c").is_none());

        let b = &list[1];
        assert_eq!(find_partition_offset(b, 2), Some(1));
        assert_eq!(find_partition_offset(b, 3), None);
    }

    #[test]
    fn test_retain_partitions() {
        let full = ts("b", &[(0, 1, 1), (1, 1, 1), (2, 1, 1)]);
        let odd = retain_partitions(&full, |p| p % 2 == 1).unwrap();
        assert_eq!(odd.partitions().collect::<Vec<_>>(), vec![1]);
        assert!(retain_partitions(&full, |p| p > 10).is_none());
    }

    #[test]
    fn test_expected_for_add() {
        let buckets = vec!["a".to_string(), "b".to_string()];
        let requested = vec![ts("b", &[(3, 1, 1), (8, 1, 1)])];

        let expected = expected_for_add(&buckets, &requested, 4);
        assert_eq!(expected["a"], BTreeSet::from([0, 1, 2, 3]));
        assert_eq!(expected["b"], BTreeSet::from([3, 8]));
    }

    #[test]
    fn test_coverage_exclusive() {
        let expected = expected_from_timestamps(&[ts("b", &[(0, 0, 0), (1, 0, 0), (2, 0, 0)])]);
        let a = ts("b", &[(0, 5, 1), (1, 5, 1)]);
        let b = ts("b", &[(2, 5, 1)]);

        let coverage = check_coverage(&expected, [("n1", &a), ("n2", &b)]);
        assert!(coverage.is_exclusive());
    }

    #[test]
    fn test_coverage_reports_missing_and_split() {
        let expected = expected_from_timestamps(&[ts("b", &[(0, 0, 0), (1, 0, 0), (2, 0, 0)])]);
        let a = ts("b", &[(0, 5, 1), (1, 5, 1)]);
        let b = ts("b", &[(1, 5, 1)]);
        let stray = ts("unrelated", &[(2, 5, 1)]);

        let coverage = check_coverage(&expected, [("n1", &a), ("n2", &b), ("n2", &stray)]);
        assert!(!coverage.is_exclusive());
        assert_eq!(coverage.missing, vec![("b".to_string(), 2)]);
        assert_eq!(
            coverage.split,
            vec![SplitOwnership {
                bucket: "b".to_string(),
                partition: 1,
                nodes: vec!["n1".to_string(), "n2".to_string()],
            }]
        );
    }

    #[test]
    fn test_coverage_of_nothing_is_exclusive() {
        let coverage = check_coverage(&ExpectedPartitions::new(), std::iter::empty());
        assert!(coverage.is_exclusive());
    }
}
