// Copyright (c) 2026-present, confly contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The per-cell accumulator and noise finaliser (component 5,
//! spec.md §4.4): running count + running record-key while a cube is
//! being built, extended with the three perturbed counts once finalised.

use crate::ptable::PTable;
use crate::rng::{Mt19937, NoiseParams};

/// A hypercube leaf. Holds the running accumulation fields always;
/// `ck`/`dpf`/`dpg` are populated by [`Self::finalise`] and are
/// meaningless before that call.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Response {
    /// Number of records that have touched this cell.
    pub count: u64,
    /// Running sum of `ρ_r / 2^32` draws for records touching this cell.
    pub rkey_sum: f64,
    /// Cell-Key bounded-noise perturbed count, after finalise.
    pub ck: i64,
    /// Laplace differential-privacy perturbed count, after finalise.
    pub dpf: f64,
    /// Geometric differential-privacy perturbed count, after finalise.
    pub dpg: i64,
}

impl Response {
    /// Builds an empty (zero-count) cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments `count` and adds `rkey` (already divided by `2^32`,
    /// i.e. in `[0, 1)`) into `rkey_sum`. Associative, so the final
    /// cellkey is independent of update order (spec.md §4.4 rationale).
    pub fn update(&mut self, rkey: f64) {
        self.count += 1;
        self.rkey_sum += rkey;
    }

    /// The cell-key: `rkey_sum mod 1.0` (IEEE-754 fmod).
    pub fn cellkey(&self) -> f64 {
        self.rkey_sum % 1.0
    }

    /// Derives `ck`, `dpf` and `dpg` from the accumulated state, the
    /// P-table and the installed noise parameters. A missing P-table
    /// interval resolves to `ck = 0` (spec.md §7 `PTableLookupMiss`,
    /// not an error).
    pub fn finalise(&mut self, ptable: &PTable, noise: &NoiseParams, rng: &mut Mt19937) {
        let cellkey = self.cellkey();
        self.ck = ptable.lookup(self.count as i64, cellkey);
        self.dpf = noise.laplace().sample(rng);
        self.dpg = noise.geometric().sample(rng);
    }

    /// Writes the four post-finalise fields joined by `sep`.
    pub fn write(&self, sep: char) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}",
            self.count, self.ck, self.dpf, self.dpg
        )
    }

    /// Reads the four whitespace-separated finalised fields.
    pub fn read(fields: &str) -> Option<Self> {
        let mut parts = fields.split_whitespace();
        let count: u64 = parts.next()?.parse().ok()?;
        let ck: i64 = parts.next()?.parse().ok()?;
        let dpf: f64 = parts.next()?.parse().ok()?;
        let dpg: i64 = parts.next()?.parse().ok()?;
        Some(Self {
            count,
            rkey_sum: 0.0,
            ck,
            dpf,
            dpg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ptable::PTableRecord;

    fn sample_ptable() -> PTable {
        let mut t = PTable::new();
        t.insert(PTableRecord {
            i: 2,
            j: 0,
            p: 1.0,
            v: 0,
            p_lb: 0.0,
            p_ub: 1.0,
        });
        t
    }

    #[test]
    fn update_is_order_independent() {
        // scenario 4 from spec.md §8: two records, rkey 0.3 and 0.8
        let mut a = Response::new();
        a.update(0.3);
        a.update(0.8);

        let mut b = Response::new();
        b.update(0.8);
        b.update(0.3);

        assert_eq!(a.count, b.count);
        assert!((a.cellkey() - b.cellkey()).abs() < 1e-12);
        assert!((a.cellkey() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn finalise_missing_interval_defaults_ck_to_zero() {
        let ptable = PTable::new();
        let noise = NoiseParams {
            dpf_mu: 0.0,
            dpf_b: 2.0,
            dpg_eps: 0.5,
        };
        let mut rng = Mt19937::new(42);
        let mut resp = Response::new();
        resp.update(0.5);
        resp.finalise(&ptable, &noise, &mut rng);
        assert_eq!(resp.ck, 0);
    }

    #[test]
    fn finalise_uses_ptable_for_ck() {
        let ptable = sample_ptable();
        let noise = NoiseParams {
            dpf_mu: 0.0,
            dpf_b: 2.0,
            dpg_eps: 0.5,
        };
        let mut rng = Mt19937::new(42);
        let mut resp = Response::new();
        resp.update(0.1);
        resp.update(0.2);
        resp.finalise(&ptable, &noise, &mut rng);
        assert_eq!(resp.ck, 0);
        assert_eq!(resp.count, 2);
    }

    #[test]
    fn write_then_read_round_trips_counts() {
        let ptable = sample_ptable();
        let noise = NoiseParams {
            dpf_mu: 0.0,
            dpf_b: 2.0,
            dpg_eps: 0.5,
        };
        let mut rng = Mt19937::new(7);
        let mut resp = Response::new();
        resp.update(0.4);
        resp.finalise(&ptable, &noise, &mut rng);

        let rendered = resp.write(';');
        let parsed = Response::read(&rendered.replace(';', " ")).unwrap();
        assert_eq!(parsed.count, resp.count);
        assert_eq!(parsed.ck, resp.ck);
        assert_eq!(parsed.dpg, resp.dpg);
    }
}
