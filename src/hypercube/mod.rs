// Copyright (c) 2026-present, confly contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The nested-map hypercube (component 6, spec.md §4.3): per-cube-id
//! accumulation of marginal updates, finalise-and-emit over the full
//! metadata Cartesian product, and cube-file read-back.
//!
//! Represented as a flat `BTreeMap<Categories, Response>` keyed by the
//! full coordinate rather than a literal chain of nested maps — an
//! acceptable alternative spec.md §9 names explicitly when `d` and
//! `|C_i|` are small, and `BTreeMap`'s own key ordering already gives
//! the "natural ordering of the column's type" invariant for free.

use crate::error::{Error, Result};
use crate::microdata::Metadata;
use crate::ptable::PTable;
use crate::response::Response;
use crate::rng::{Mt19937, NoiseParams};
use crate::schema::Schema;
use crate::traversing::TraversingStore;
use crate::tuple::{self, Categories};
use crate::value::Value;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};

/// One replica of the hypercube, identified by a *local* cube index
/// (the index used for `T[c][k]`, not necessarily the global
/// `cube_<id>.csv` filename index — the driver keeps those separate).
pub struct Hypercube {
    cube_id: usize,
    mask: u64,
    cells: BTreeMap<Categories, Response>,
}

impl Hypercube {
    /// An empty cube for local index `cube_id`, with in-cube mask
    /// `mask` (the schema's forced-total columns).
    pub fn new(cube_id: usize, mask: u64) -> Self {
        Self {
            cube_id,
            mask,
            cells: BTreeMap::new(),
        }
    }

    pub fn cube_id(&self) -> usize {
        self.cube_id
    }

    pub fn mask(&self) -> u64 {
        self.mask
    }

    /// Marginal expansion (spec.md §4.3): `categories` is one sampled
    /// record's category tuple, already stripped of the record-id and
    /// record-key columns. Every qualifying marginal mask `i` is a
    /// superset of `self.mask` — the forced-total columns are always
    /// collapsed, and every subset of the remaining ("cube=true")
    /// columns is additionally collapsed in turn, producing the full
    /// sub-total lattice over them. `i & self.mask == self.mask` is
    /// therefore the qualifying test, not its mirror `i & self.mask ==
    /// i`: scenario 1 of spec.md §8 pins the `mask=0` case to the full
    /// `2^(d-1)`-cell lattice, which only the superset reading produces.
    pub fn update(&mut self, schema: &Schema, categories: &[Value], rkey_fraction: f64) {
        let width = schema.category_count();
        let universe = 1u64 << width;
        for i in 0..universe {
            if i & self.mask != self.mask {
                continue;
            }
            let coord = tuple::apply_mask(schema, i, categories);
            self.cells
                .entry(coord)
                .or_insert_with(Response::new)
                .update(rkey_fraction);
        }
    }

    /// Finalises and writes every cell in the metadata's full
    /// Cartesian product — not merely the populated keys — so that
    /// unvisited coordinates are emitted as zero-count cells that
    /// still draw noise (spec.md §4.3 "Iteration contract").
    ///
    /// If `traversing` is `Some`, every finalised leaf is additionally
    /// written into `T[coord][self.cube_id]`.
    pub fn finalise_and_emit<W: Write>(
        &mut self,
        schema: &Schema,
        meta: &Metadata,
        ptable: &PTable,
        noise: &NoiseParams,
        rng: &mut Mt19937,
        sep: char,
        mut out: W,
        mut traversing: Option<&mut TraversingStore>,
    ) -> Result<()> {
        for coord in cartesian_coordinates(schema, meta) {
            let mut resp = self.cells.remove(&coord).unwrap_or_default();
            resp.finalise(ptable, noise, rng);

            let mut line = String::new();
            tuple::write(&mut line, sep, &coord);
            line.push(sep);
            line.push_str(&resp.write(sep));
            line.push('\n');
            out.write_all(line.as_bytes())
                .map_err(Error::OutputWriteError)?;

            if let Some(store) = traversing.as_deref_mut() {
                store.insert(self.cube_id, coord, resp);
            }
        }
        Ok(())
    }

    /// Reconstructs a cube from its on-disk `cube_<id>.csv` form
    /// (spec.md §4.3 "Read-back"). Every line is `width` category
    /// fields followed by the four finalised response fields.
    pub fn read_back<R: BufRead>(
        schema: &Schema,
        cube_id: usize,
        mask: u64,
        reader: R,
        sep: char,
    ) -> Result<Self> {
        let mut cube = Self::new(cube_id, mask);
        let width = schema.category_count();

        for line in reader.lines() {
            let line = line.map_err(|e| Error::CubeReadError(e.to_string()))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split(sep).collect();
            if fields.len() != width + 4 {
                return Err(Error::CubeReadError(format!(
                    "expected {} fields, found {} in {line:?}",
                    width + 4,
                    fields.len()
                )));
            }

            let categories: Categories = fields[..width]
                .iter()
                .enumerate()
                .map(|(idx, f)| {
                    Value::parse(schema.column_type(idx + 1), f)
                        .map_err(|_| Error::CubeReadError(format!("bad field {f:?} in {line:?}")))
                })
                .collect::<Result<_>>()?;

            let response_fields = fields[width..].join(" ");
            let response = Response::read(&response_fields).ok_or_else(|| {
                Error::CubeReadError(format!("malformed response fields in {line:?}"))
            })?;
            cube.cells.insert(categories, response);
        }

        Ok(cube)
    }

    /// Consumes the cube, yielding every `(coordinate, response)` pair
    /// it holds — used by the distribution driver's reduce pass to
    /// feed a read-back cube into the traversing store.
    pub fn into_cells(self) -> impl Iterator<Item = (Categories, Response)> {
        self.cells.into_iter()
    }

    /// Number of populated cells (before finalise-and-emit re-expands
    /// to the full Cartesian product).
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Every coordinate in `(C_1 ∪ {τ_1}) × … × (C_{d-1} ∪ {τ_{d-1}})`, in
/// the natural order of column 1's set, then column 2's, and so on
/// (spec.md §4.3 "Finalise-and-emit").
fn cartesian_coordinates(schema: &Schema, meta: &Metadata) -> Vec<Categories> {
    let mut acc: Vec<Categories> = vec![Vec::new()];
    for i in 1..=schema.category_count() {
        let set = meta.category_set(i);
        let mut next = Vec::with_capacity(acc.len() * set.len().max(1));
        for prefix in &acc {
            for v in set {
                let mut coord = prefix.clone();
                coord.push(v.clone());
                next.push(coord);
            }
        }
        acc = next;
    }
    acc
}
