//! Status grouping

use std::collections::BTreeMap;

use serde::Serialize;

use crate::parser::Record;
use crate::types::Status;

/// Records partitioned by status. Every allowed status has a bucket, possibly
/// empty; records keep their input order within a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusGroups {
    buckets: BTreeMap<Status, Vec<Record>>,
}

impl StatusGroups {
    pub fn get(&self, status: Status) -> &[Record] {
        self.buckets.get(&status).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn statuses(&self) -> impl Iterator<Item = Status> + '_ {
        self.buckets.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Status, &[Record])> {
        self.buckets.iter().map(|(s, r)| (*s, r.as_slice()))
    }

    /// Records across all buckets
    pub fn total(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn into_inner(self) -> BTreeMap<Status, Vec<Record>> {
        self.buckets
    }
}

/// Partition `records` by the value of `status_field`.
///
/// Records whose status is missing, unknown or not in `allowed` are dropped.
pub fn group_by_status(records: &[Record], status_field: &str, allowed: &[Status]) -> StatusGroups {
    let mut buckets: BTreeMap<Status, Vec<Record>> =
        allowed.iter().map(|s| (*s, Vec::new())).collect();

    for record in records {
        let Some(status) = record.field(status_field).and_then(Status::from_cell) else {
            continue;
        };
        if let Some(bucket) = buckets.get_mut(&status) {
            bucket.push(record.clone());
        }
    }
    StatusGroups { buckets }
}
