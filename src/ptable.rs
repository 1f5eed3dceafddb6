// Copyright (c) 2026-present, confly contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The Cell-Key perturbation table: a pre-computed lookup artefact
//! (generated externally, see spec.md §1) that this crate only loads,
//! indexes and queries (component 2, spec.md §2/§4.5).

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::io::BufRead;

/// One row of the P-table: for running count `i`, the interval
/// `[p_lb, p_ub]` of cell-key space assigned to noise value `v`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PTableRecord {
    /// Running count this record applies to.
    pub i: i64,
    /// Secondary index, carried through unmodified (not used for lookup).
    pub j: i64,
    /// Probability mass of this interval.
    pub p: f64,
    /// Noise value assigned to this interval.
    pub v: i64,
    /// Lower bound of the assigned cell-key interval.
    pub p_lb: f64,
    /// Upper bound of the assigned cell-key interval.
    pub p_ub: f64,
}

impl PTableRecord {
    fn parse(line: &str) -> Result<Self> {
        let mut fields = line.split_whitespace();
        let mut next = |name: &str| -> Result<&str> {
            fields
                .next()
                .ok_or_else(|| Error::PTableReadError(format!("missing field {name}")))
        };

        let i: i64 = next("i")?
            .parse()
            .map_err(|_| Error::PTableReadError("i is not an integer".into()))?;
        let j: i64 = next("j")?
            .parse()
            .map_err(|_| Error::PTableReadError("j is not an integer".into()))?;
        let p: f64 = next("p")?
            .parse()
            .map_err(|_| Error::PTableReadError("p is not a number".into()))?;
        let v: i64 = next("v")?
            .parse()
            .map_err(|_| Error::PTableReadError("v is not an integer".into()))?;
        let p_lb: f64 = next("p_lb")?
            .parse()
            .map_err(|_| Error::PTableReadError("p_lb is not a number".into()))?;
        let p_ub: f64 = next("p_ub")?
            .parse()
            .map_err(|_| Error::PTableReadError("p_ub is not a number".into()))?;

        Ok(Self {
            i,
            j,
            p,
            v,
            p_lb,
            p_ub,
        })
    }
}

/// Multi-map from running count to the noise-interval records that
/// apply to it.
#[derive(Debug, Default)]
pub struct PTable {
    n_cat: i64,
    records: BTreeMap<i64, Vec<PTableRecord>>,
}

impl PTable {
    /// Builds an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts one record, tracking `n_cat = max(i)`.
    pub fn insert(&mut self, record: PTableRecord) {
        if record.i > self.n_cat {
            self.n_cat = record.i;
        }
        self.records.entry(record.i).or_default().push(record);
    }

    /// Number of categories seen so far (`max(i)` over inserted records).
    pub fn n_cat(&self) -> i64 {
        self.n_cat
    }

    /// Total number of records held.
    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// True when no records have been inserted.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Looks up the noise value `v` for running count `i` and cell-key
    /// `cellkey`. Wraps `i` modulo `n_cat + 1` when it exceeds the
    /// table's known category range (spec.md §4.5). Returns `0` when
    /// no interval contains `cellkey` — a defensive default signalling
    /// a malformed table, not an error (spec.md §7 `PTableLookupMiss`).
    pub fn lookup(&self, i: i64, cellkey: f64) -> i64 {
        let idx = if i > self.n_cat {
            i % (self.n_cat + 1)
        } else {
            i
        };

        let Some(candidates) = self.records.get(&idx) else {
            return 0;
        };

        candidates
            .iter()
            .find(|rec| rec.p_lb <= cellkey && cellkey <= rec.p_ub)
            .map_or(0, |rec| rec.v)
    }

    /// Loads whitespace-separated `i j p v p_lb p_ub` records, one per
    /// line, until EOF.
    pub fn load<R: BufRead>(reader: R) -> Result<Self> {
        let mut table = Self::new();
        for line in reader.lines() {
            let line = line.map_err(|e| Error::PTableReadError(e.to_string()))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            table.insert(PTableRecord::parse(trimmed)?);
        }
        Ok(table)
    }
}
