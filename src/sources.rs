//! # Source Aggregation
//!
//! Accumulates per-source match statistics from parsed expanded-block lines.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::expanded::SourceContribution;

/// One blacklist source seen during a job.
///
/// Identity fields come from the first sighting; later sightings only bump
/// the counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRecord {
    pub source_id: i64,
    pub repository_name: String,
    pub filename: String,
    pub filesize: i64,
    pub file_hashdigest: String,
    pub match_count: u64,
    pub unflagged_count: u64,
}

impl SourceRecord {
    fn from_contribution(contribution: SourceContribution) -> Self {
        Self {
            source_id: contribution.source_id,
            repository_name: contribution.repository_name,
            filename: contribution.filename,
            filesize: contribution.filesize,
            file_hashdigest: contribution.file_hashdigest,
            match_count: 0,
            unflagged_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateSummary {
    pub total_matches: u64,
    pub total_unflagged: u64,
    pub distinct_sources: u64,
}

impl fmt::Display for AggregateSummary {
    // Only the leading count form branches on one match; "hashs" is verbatim.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total_matches == 1 {
            write!(
                f,
                "1 Blacklist block hash ({} unflagged) found in {} sources",
                self.total_unflagged, self.distinct_sources
            )
        } else {
            write!(
                f,
                "{} Blacklist block hashs ({} unflagged) found in {} sources",
                self.total_matches, self.total_unflagged, self.distinct_sources
            )
        }
    }
}

#[derive(Debug, Default)]
pub struct SourceAggregator {
    records: HashMap<i64, SourceRecord>,
}

impl SourceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every contribution from one parsed line.
    ///
    /// Not idempotent: applying the same line twice counts it twice.
    pub fn apply(&mut self, contributions: Vec<SourceContribution>) {
        for contribution in contributions {
            let unflagged = contribution.is_unflagged;
            let record = self
                .records
                .entry(contribution.source_id)
                .or_insert_with(|| SourceRecord::from_contribution(contribution));
            record.match_count += 1;
            if unflagged {
                record.unflagged_count += 1;
            }
        }
    }

    pub fn totals(&self) -> AggregateSummary {
        let mut summary = AggregateSummary {
            distinct_sources: self.records.len() as u64,
            ..AggregateSummary::default()
        };
        for record in self.records.values() {
            summary.total_matches += record.match_count;
            summary.total_unflagged += record.unflagged_count;
        }
        summary
    }

    pub fn source_count(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, source_id: i64) -> Option<&SourceRecord> {
        self.records.get(&source_id)
    }

    /// Records ordered by source id.
    pub fn records(&self) -> Vec<&SourceRecord> {
        let mut records: Vec<&SourceRecord> = self.records.values().collect();
        records.sort_by_key(|r| r.source_id);
        records
    }
}
