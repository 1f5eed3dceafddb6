// Copyright (c) 2026-present, confly contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The schema-driven tuple engine (component 3, spec.md §4.1):
//! read/write, emptiness test, total-code substitution and metadata
//! accumulation.
//!
//! Column 0 (the record id) never flows through here: spec.md §9's
//! design note splits its two responsibilities apart, so this module
//! only ever sees the category columns (1..d). [`crate::microdata`]
//! owns the raw id text and the freshly-drawn record-key separately.

use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::value::Value;

/// A row of category values, one per schema column (1-based columns
/// 1..d, stored 0-indexed here).
pub type Categories = Vec<Value>;

/// Splits `line` on `sep` and parses each field into the type declared
/// by `schema`, after the record-id field has already been stripped by
/// the caller. Whitespace around each field is trimmed.
pub fn read(schema: &Schema, line: &str, sep: char) -> Result<Categories> {
    let fields: Vec<&str> = line.split(sep).collect();
    if fields.len() != schema.category_count() {
        return Err(Error::SchemaMismatch {
            expected: format!("{} fields", schema.category_count()),
            actual: format!("{} fields", fields.len()),
        });
    }

    fields
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            let ty = schema.column_type(idx + 1);
            Value::parse(ty, field).map_err(|_| Error::SchemaMismatch {
                expected: format!("{ty:?}"),
                actual: (*field).to_string(),
            })
        })
        .collect()
}

/// True when every column of `categories` equals its type's default
/// value — such a row is treated as a blank line and skipped by the
/// caller (spec.md §4.1).
pub fn is_empty(schema: &Schema, categories: &[Value]) -> bool {
    categories
        .iter()
        .enumerate()
        .all(|(idx, v)| *v == schema.column_type(idx + 1).default_value())
}

/// Writes `categories` to `out`, separator *between* fields only (no
/// leading, trailing, or terminating separator/newline).
pub fn write(out: &mut String, sep: char, categories: &[Value]) {
    for (idx, v) in categories.iter().enumerate() {
        if idx > 0 {
            out.push(sep);
        }
        out.push_str(&v.to_display_string());
    }
}

/// For every set bit `i` of `mask`, overwrites category column `i`
/// (0-indexed, i.e. schema column `i+1`) with that column's
/// total-code. Bits of `mask` outside `0..category_count` are ignored
/// by construction (callers only ever pass masks that are subsets of
/// the schema's aggregation mask).
pub fn apply_mask(schema: &Schema, mask: u64, categories: &[Value]) -> Categories {
    categories
        .iter()
        .enumerate()
        .map(|(idx, v)| {
            if mask & (1 << idx) != 0 {
                schema.column_type(idx + 1).total_code()
            } else {
                v.clone()
            }
        })
        .collect()
}

/// The coordinate whose every column is its type's total-code —
/// guarantees `τ_i ∈ C_i` even when the input never contains it
/// (spec.md §4.1/§4.2).
pub fn total_code_tuple(schema: &Schema) -> Categories {
    schema
        .columns()
        .iter()
        .map(|c| c.ty.total_code())
        .collect()
}

/// Checks the precondition that no legitimate value equals its
/// column's total-code (spec.md §3 invariant). Returns the first
/// colliding column (1-based) if any.
pub fn check_no_total_code_collision(categories: &[Value]) -> Result<()> {
    for (idx, v) in categories.iter().enumerate() {
        if v.is_total_code() {
            return Err(Error::TotalCodeCollision {
                column: idx + 1,
                value: v.to_display_string(),
            });
        }
    }
    Ok(())
}
