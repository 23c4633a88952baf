//! Observation derivation
//!
//! This module lifts snapshot records into modelling observations:
//! - Numeric day, block and within-block trial positions
//! - Trial number across the day (1-9 for 3 blocks of 3 trials)
//! - Block identifier grouping the trials of one subject/day/block

use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{LogRecord, Observation, TRIALS_PER_BLOCK};

/// Observations plus the number of records that could not be lifted
#[derive(Debug, Clone, Default, Serialize)]
pub struct ObservationSet {
    pub observations: Vec<Observation>,
    /// Records missing subject, group or Day/Block/Trial, or with a
    /// within-block trial outside 1..=3
    pub skipped: usize,
}

impl ObservationSet {
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Observations of one group, in input order
    pub fn group(&self, label: &str) -> Vec<&Observation> {
        self.observations.iter().filter(|o| o.is_group(label)).collect()
    }

    pub fn subject_count(&self) -> usize {
        distinct(self.observations.iter().map(|o| o.subject.as_str()))
    }

    pub fn block_count(&self) -> usize {
        distinct(self.observations.iter().map(|o| o.block_id.as_str()))
    }

    /// Row counts per group label
    pub fn group_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for obs in &self.observations {
            *counts.entry(obs.group.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Row counts per day token
    pub fn day_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for obs in &self.observations {
            *counts.entry(obs.day.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Distinct values of a string iterator
pub fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    values.collect::<BTreeSet<_>>().len()
}

/// Deriver for modelling observations
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Derive observations from snapshot records
    pub fn derive(records: &[LogRecord]) -> ObservationSet {
        let mut set = ObservationSet::default();
        for record in records {
            match derive_one(record) {
                Some(obs) => set.observations.push(obs),
                None => set.skipped += 1,
            }
        }
        if set.skipped > 0 {
            debug!("{} records lacked fields required for modelling", set.skipped);
        }
        set
    }
}

fn derive_one(record: &LogRecord) -> Option<Observation> {
    let subject = record.subject.clone()?;
    let group = record.group.clone()?;
    let parts = record.condition_parts()?;

    let day_num = parts.day_num()?;
    let block_num = parts.block_num()?;
    let trial_within_block = parts.trial_num()?;
    if block_num == 0 || !(1..=TRIALS_PER_BLOCK).contains(&trial_within_block) {
        return None;
    }
    let trial_number = (block_num - 1) * TRIALS_PER_BLOCK + trial_within_block;
    let block_id = format!("{}_{}_{}", subject, parts.day, parts.block);

    Some(Observation {
        subject,
        group,
        day: parts.day,
        block: parts.block,
        day_num,
        block_num,
        trial_within_block,
        trial_number,
        block_id,
        symb: record.symb,
        perm: record.perm,
    })
}
