// Copyright (c) 2026-present, confly contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The microdata store (component 4, spec.md §4.2): ingests the raw
//! rows once, draws each row's record-key, and accumulates per-column
//! category metadata under the aggregation mask.

use crate::error::Result;
use crate::rng::{uniform_u32, Mt19937};
use crate::schema::Schema;
use crate::tuple;
use crate::value::Value;
use std::collections::BTreeSet;
use std::io::BufRead;

/// One ingested row: the raw opaque id text, the freshly drawn
/// record-key ρ_r, and the parsed category values.
#[derive(Clone, Debug)]
pub struct Record {
    /// Opaque identifier read from column 0 — carried for diagnostics
    /// only, never aggregated (spec.md §3).
    pub id: String,
    /// Record-key ρ_r, a fresh uniform 32-bit draw (spec.md §3).
    pub rkey: u32,
    /// Parsed category columns (1..d).
    pub categories: tuple::Categories,
}

impl Record {
    /// `ρ_r / 2^32`, the value fed into [`crate::response::Response::update`].
    pub fn rkey_fraction(&self) -> f64 {
        f64::from(self.rkey) / 4_294_967_296.0_f64
    }
}

/// Per-column category metadata: `C_i` for each category column.
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    sets: Vec<BTreeSet<Value>>,
}

impl Metadata {
    /// An empty metadata set for a schema with `category_count`
    /// category columns — every `C_i` starts empty.
    pub fn new(category_count: usize) -> Self {
        Self {
            sets: vec![BTreeSet::new(); category_count],
        }
    }

    /// The observed category set for column `i` (1-based).
    pub fn category_set(&self, i: usize) -> &BTreeSet<Value> {
        &self.sets[i - 1]
    }

    /// Inserts `categories[i]` into `C_{i+1}` for every column.
    pub fn accumulate(&mut self, categories: &[Value]) {
        for (set, v) in self.sets.iter_mut().zip(categories.iter()) {
            set.insert(v.clone());
        }
    }
}

/// The ingested microdata table: the raw record vector, the
/// aggregation mask, and the category metadata accumulated under it.
pub struct MicrodataStore {
    schema: Schema,
    mask: u64,
    records: Vec<Record>,
    meta: Metadata,
}

impl MicrodataStore {
    /// Reads rows from `reader` until EOF, assigning each a fresh
    /// record-key and accumulating masked metadata (spec.md §4.2).
    /// Blank lines (every category column at its type default) are
    /// skipped. `mask` is the schema's aggregation mask (spec.md §3).
    pub fn ingest<R: BufRead>(
        schema: Schema,
        mask: u64,
        reader: R,
        sep: char,
        rng: &mut Mt19937,
    ) -> Result<Self> {
        let mut records = Vec::new();
        let mut meta = Metadata::new(schema.category_count());

        for line in reader.lines() {
            let line = line.map_err(crate::error::Error::MicroReadError)?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.splitn(2, sep);
            let id = fields.next().unwrap_or_default().trim().to_string();
            let rest = fields.next().unwrap_or_default();

            let categories = tuple::read(&schema, rest, sep)?;
            if tuple::is_empty(&schema, &categories) {
                continue;
            }
            tuple::check_no_total_code_collision(&categories)?;

            let masked = tuple::apply_mask(&schema, mask, &categories);
            meta.accumulate(&masked);

            records.push(Record {
                id,
                rkey: uniform_u32(rng),
                categories,
            });
        }

        // Guarantee tau_i in C_i even when the mask never forces it
        // (spec.md §4.2).
        meta.accumulate(&tuple::total_code_tuple(&schema));

        Ok(Self {
            schema,
            mask,
            records,
            meta,
        })
    }

    /// The schema this store was ingested under.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The aggregation mask applied during ingest.
    pub fn mask(&self) -> u64 {
        self.mask
    }

    /// The ingested records, read-only.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// The accumulated per-column category metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSpec;
    use crate::value::ColumnType;
    use std::io::Cursor;

    fn schema() -> Schema {
        Schema::new(vec![
            ColumnSpec {
                name: "a".into(),
                ty: ColumnType::Long,
                cube: true,
            },
            ColumnSpec {
                name: "b".into(),
                ty: ColumnType::Long,
                cube: false,
            },
        ])
    }

    #[test]
    fn ingest_skips_blank_lines_and_draws_record_keys() {
        let data = "id1;1;2\n\nid2;3;4\n";
        let mut rng = Mt19937::new(42);
        let store =
            MicrodataStore::ingest(schema(), 0b10, Cursor::new(data), ';', &mut rng).unwrap();
        assert_eq!(store.records().len(), 2);
        assert_ne!(store.records()[0].rkey, store.records()[1].rkey);
    }

    #[test]
    fn ingest_accumulates_masked_metadata() {
        let data = "id1;1;2\nid2;3;4\n";
        let mut rng = Mt19937::new(42);
        let store =
            MicrodataStore::ingest(schema(), 0b10, Cursor::new(data), ';', &mut rng).unwrap();

        // column b (mask bit set) is aggregation-only: only tau_b ever appears
        let b_set = store.metadata().category_set(2);
        assert_eq!(b_set.len(), 1);
        assert!(b_set.contains(&Value::Long(-1)));

        // column a is reported as-is, plus its total-code from the guarantee pass
        let a_set = store.metadata().category_set(1);
        assert!(a_set.contains(&Value::Long(1)));
        assert!(a_set.contains(&Value::Long(3)));
        assert!(a_set.contains(&Value::Long(-1)));
    }

    #[test]
    fn ingest_rejects_total_code_collision() {
        let data = "id1;-1;2\n";
        let mut rng = Mt19937::new(42);
        let err = MicrodataStore::ingest(schema(), 0, Cursor::new(data), ';', &mut rng)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::TotalCodeCollision { column: 1, .. }
        ));
    }

    #[test]
    fn total_code_always_present_even_with_zero_mask() {
        let data = "id1;1;2\n";
        let mut rng = Mt19937::new(1);
        let store = MicrodataStore::ingest(schema(), 0, Cursor::new(data), ';', &mut rng).unwrap();
        assert!(store.metadata().category_set(1).contains(&Value::Long(-1)));
        assert!(store.metadata().category_set(2).contains(&Value::Long(-1)));
    }
}
