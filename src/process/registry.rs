//! Storage for thread records with a stable identity index.
//!
//! Records live in a slot arena addressed by generation-checked keys. The
//! tid index and the sort list hold keys, never references, so inserting
//! never invalidates what callers already hold; a key to a removed record
//! simply stops resolving.

use super::record::{SortKey, ThreadRecord, Tid};
use crate::counters::{CounterBackend, CounterManager, FAILED_READ};
use ahash::AHashMap as HashMap;
use std::cmp::Ordering;
use tracing::trace;

/// Stable handle to a record in a `ProcessRegistry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordKey {
    index: u32,
    generation: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    record: Option<ThreadRecord>,
}

/// Ordering for displayed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Tid,
    Name,
    Cmdline,
    /// By the sort key computed for column `index`.
    Column { index: usize, descending: bool },
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Column {
            index: 0,
            descending: true,
        }
    }
}

/// All known threads, live and dead.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    index: HashMap<Tid, RecordKey>,
    order: Vec<RecordKey>,
    sticky: bool,
}

impl ProcessRegistry {
    /// `sticky` keeps dead records around until `purge_dead`.
    pub fn new(sticky: bool) -> Self {
        Self {
            sticky,
            ..Default::default()
        }
    }

    pub fn set_sticky(&mut self, sticky: bool) {
        self.sticky = sticky;
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Stores `record`. Fails, handing the record back, if a record with the
    /// same tid is already present.
    pub fn insert(&mut self, record: ThreadRecord) -> Result<RecordKey, ThreadRecord> {
        if self.index.contains_key(&record.tid) {
            return Err(record);
        }
        let tid = record.tid;
        let key = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.record = Some(record);
                RecordKey {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    record: Some(record),
                });
                RecordKey {
                    index,
                    generation: 0,
                }
            }
        };
        self.index.insert(tid, key);
        self.order.push(key);
        Ok(key)
    }

    pub fn key_of(&self, tid: Tid) -> Option<RecordKey> {
        self.index.get(&tid).copied()
    }

    pub fn contains(&self, tid: Tid) -> bool {
        self.index.contains_key(&tid)
    }

    pub fn get(&self, key: RecordKey) -> Option<&ThreadRecord> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.record.as_ref()
    }

    pub fn get_mut(&mut self, key: RecordKey) -> Option<&mut ThreadRecord> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.record.as_mut()
    }

    pub fn lookup(&self, tid: Tid) -> Option<&ThreadRecord> {
        self.get(self.key_of(tid)?)
    }

    pub fn lookup_mut(&mut self, tid: Tid) -> Option<&mut ThreadRecord> {
        let key = self.key_of(tid)?;
        self.get_mut(key)
    }

    /// Flags the thread dead and closes its counters. Returns false if the
    /// tid is unknown or already dead.
    pub fn mark_dead<B: CounterBackend>(
        &mut self,
        tid: Tid,
        counters: &mut CounterManager<B>,
    ) -> bool {
        let Some(record) = self.lookup_mut(tid) else {
            return false;
        };
        if record.dead {
            return false;
        }
        record.dead = true;
        counters.release_all(&mut record.handles);
        trace!("Thread {} ({}) exited", tid, record.name);
        true
    }

    fn take(&mut self, key: RecordKey) -> Option<ThreadRecord> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        Some(record)
    }

    /// Removes the record for `tid`. Its counter handles must already be
    /// released (dead records) or be released by the caller.
    pub fn remove(&mut self, tid: Tid) -> Option<ThreadRecord> {
        let key = self.index.remove(&tid)?;
        self.order.retain(|k| *k != key);
        self.take(key)
    }

    /// Removes dead records unless sticky. Returns how many were removed.
    pub fn compact(&mut self) -> usize {
        if self.sticky {
            return 0;
        }
        self.purge_dead()
    }

    /// Removes every dead record, sticky or not.
    pub fn purge_dead(&mut self) -> usize {
        let dead: Vec<RecordKey> = self
            .order
            .iter()
            .copied()
            .filter(|k| self.get(*k).map_or(false, |r| r.dead))
            .collect();
        if dead.is_empty() {
            return 0;
        }
        for key in &dead {
            if let Some(record) = self.take(*key) {
                self.index.remove(&record.tid);
            }
        }
        let slots = &self.slots;
        self.order.retain(|k| {
            slots
                .get(k.index as usize)
                .map_or(false, |s| s.generation == k.generation && s.record.is_some())
        });
        dead.len()
    }

    /// Keys of all records, in insertion order.
    pub fn snapshot_for_sort(&self) -> &[RecordKey] {
        &self.order
    }

    /// All records, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ThreadRecord> {
        self.order.iter().filter_map(move |k| self.get(*k))
    }

    /// All records, in arena order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ThreadRecord> {
        self.slots.iter_mut().filter_map(|s| s.record.as_mut())
    }

    /// Displayable (non-skipped) records in the requested order.
    pub fn sorted(&self, order: SortOrder) -> Vec<&ThreadRecord> {
        let mut rows: Vec<&ThreadRecord> = self.iter().filter(|r| !r.skip).collect();
        rows.sort_by(|a, b| compare_records(a, b, order));
        rows
    }

    /// Zeroes the per-process totals held by main-thread records.
    pub fn reset_aggregates(&mut self) {
        for record in self.iter_mut().filter(|r| r.is_main()) {
            record.cpu_percent = 0.0;
            record.cpu_percent_sys = 0.0;
            record.cpu_percent_user = 0.0;
            record.values.iter_mut().for_each(|v| *v = 0);
        }
    }

    /// Adds every live secondary thread into its process's main record.
    /// Only current values are summed: the owner's previous values already
    /// hold last cycle's totals.
    ///
    /// CPU percentages are always summed. For counters, a failed read on
    /// any contributing thread leaves `FAILED_READ` in the owner's slot,
    /// and later threads no longer add to that slot.
    pub fn accumulate(&mut self) {
        for (owner, cpu, values) in self.contributions() {
            let Some(owner) = self.get_mut(owner).filter(|r| !r.dead) else {
                continue;
            };
            owner.cpu_percent += cpu[0];
            owner.cpu_percent_sys += cpu[1];
            owner.cpu_percent_user += cpu[2];
            merge_counts(&mut owner.values, &values);
        }
    }

    /// Points main records' current values back at their own reads. With
    /// `per_process` the live secondary threads are summed in again, so
    /// the values match what a per-process cycle would have left.
    pub fn rebaseline(&mut self, per_process: bool) {
        for record in self.iter_mut().filter(|r| r.is_main()) {
            if record.own_values.len() == record.values.len() {
                record.values.clone_from(&record.own_values);
            }
        }
        if !per_process {
            return;
        }
        for (owner, _, values) in self.contributions() {
            if let Some(owner) = self.get_mut(owner).filter(|r| !r.dead) {
                merge_counts(&mut owner.values, &values);
            }
        }
    }

    // (owner, [total, sys, user] CPU percent, current values) per live
    // secondary thread
    fn contributions(&self) -> Vec<(RecordKey, [f64; 3], Vec<u64>)> {
        self.iter()
            .filter(|r| !r.dead && !r.is_main())
            .filter_map(|r| {
                let owner = self.key_of(r.pid)?;
                let cpu = [r.cpu_percent, r.cpu_percent_sys, r.cpu_percent_user];
                Some((owner, cpu, r.values.clone()))
            })
            .collect()
    }

    /// Closes every open counter handle, keeping the records.
    pub fn release_all<B: CounterBackend>(&mut self, counters: &mut CounterManager<B>) {
        for record in self.iter_mut() {
            counters.release_all(&mut record.handles);
        }
    }

    /// Closes every handle and forgets every record.
    pub fn clear<B: CounterBackend>(&mut self, counters: &mut CounterManager<B>) {
        self.release_all(counters);
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.order.clear();
    }
}

fn merge_counts(owner: &mut [u64], child: &[u64]) {
    for (slot, value) in owner.iter_mut().zip(child) {
        if *slot == FAILED_READ {
            continue;
        }
        if *value == FAILED_READ {
            *slot = FAILED_READ;
        } else {
            *slot = slot.wrapping_add(*value);
        }
    }
}

fn compare_records(a: &ThreadRecord, b: &ThreadRecord, order: SortOrder) -> Ordering {
    let primary = match order {
        SortOrder::Tid => Ordering::Equal,
        SortOrder::Name => a.name.cmp(&b.name),
        SortOrder::Cmdline => a.cmdline.cmp(&b.cmdline),
        SortOrder::Column { descending, .. } => a.sort_key.compare(&b.sort_key, descending),
    };
    primary.then(a.tid.cmp(&b.tid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::record::TaskIdentity;

    fn record(tid: Tid, pid: Tid, name: &str) -> ThreadRecord {
        ThreadRecord::new(TaskIdentity {
            tid,
            pid,
            uid: 0,
            user: "root".into(),
            name: name.into(),
            cmdline: format!("/bin/{}", name),
            num_threads: 1,
        })
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut reg = ProcessRegistry::new(false);
        let k1 = reg.insert(record(1, 1, "init")).unwrap();
        let k2 = reg.insert(record(2, 2, "kthreadd")).unwrap();
        assert_ne!(k1, k2);
        assert_eq!(reg.lookup(1).unwrap().name, "init");
        assert_eq!(reg.get(k2).unwrap().tid, 2);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_duplicate_insert_returns_record() {
        let mut reg = ProcessRegistry::new(false);
        reg.insert(record(1, 1, "a")).unwrap();
        let back = reg.insert(record(1, 1, "b")).unwrap_err();
        assert_eq!(back.name, "b");
        assert_eq!(reg.lookup(1).unwrap().name, "a");
    }

    #[test]
    fn test_removed_key_does_not_resolve_after_slot_reuse() {
        let mut reg = ProcessRegistry::new(false);
        let old = reg.insert(record(5, 5, "old")).unwrap();
        reg.remove(5).unwrap();
        let new = reg.insert(record(6, 6, "new")).unwrap();
        assert!(reg.get(old).is_none());
        assert_eq!(reg.get(new).unwrap().name, "new");
    }

    #[test]
    fn test_merge_counts_poisoning() {
        let mut owner = vec![10, 20, FAILED_READ];
        merge_counts(&mut owner, &[1, FAILED_READ, 5]);
        assert_eq!(owner, vec![11, FAILED_READ, FAILED_READ]);
        merge_counts(&mut owner, &[1, 2, 3]);
        assert_eq!(owner, vec![12, FAILED_READ, FAILED_READ]);
    }

    #[test]
    fn test_sorted_by_name_then_tid() {
        let mut reg = ProcessRegistry::new(false);
        reg.insert(record(3, 3, "b")).unwrap();
        reg.insert(record(2, 2, "a")).unwrap();
        reg.insert(record(1, 1, "b")).unwrap();
        let tids: Vec<Tid> = reg.sorted(SortOrder::Name).iter().map(|r| r.tid).collect();
        assert_eq!(tids, vec![2, 1, 3]);
        let tids: Vec<Tid> = reg.sorted(SortOrder::Tid).iter().map(|r| r.tid).collect();
        assert_eq!(tids, vec![1, 2, 3]);
    }

    #[test]
    fn test_sorted_skips_hidden_records() {
        let mut reg = ProcessRegistry::new(false);
        reg.insert(record(1, 1, "a")).unwrap();
        reg.insert(record(2, 2, "b")).unwrap();
        reg.lookup_mut(2).unwrap().skip = true;
        assert_eq!(reg.sorted(SortOrder::Tid).len(), 1);
    }

    #[test]
    fn test_sorted_by_column_descending() {
        let mut reg = ProcessRegistry::new(false);
        for (tid, key) in [(1, SortKey::Float(5.0)), (2, SortKey::Unset), (3, SortKey::Float(9.0))] {
            let mut r = record(tid, tid, "x");
            r.sort_key = key;
            reg.insert(r).unwrap();
        }
        let order = SortOrder::Column {
            index: 0,
            descending: true,
        };
        let tids: Vec<Tid> = reg.sorted(order).iter().map(|r| r.tid).collect();
        assert_eq!(tids, vec![3, 1, 2]);
    }
}
