// Copyright (c) 2026-present, confly contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The `--random` noise diagnostic (spec.md §4.10), grounded on
//! `examples/original_source/src/confly.cpp`'s `random_draws()`: draws
//! `n` independent `(laplace, geometric)` pairs from one seeded PRNG
//! stream and writes them as a CSV so an operator can sanity-check a
//! configuration's noise parameters before running a real aggregation.
//!
//! The original also shells out to an R script to plot an ECDF of the
//! draws; that's an external plotting concern and out of scope here
//! (spec.md's Non-goals exclude rendering) — the CSV is the
//! deliverable and callers are free to plot it with whatever they have
//! on hand.

use crate::error::{Error, Result};
use crate::rng::{Mt19937, NoiseParams};
use std::io::Write;
use std::path::Path;

/// Draws `n` `(laplace, geometric)` pairs from `params` seeded with
/// `seed` and writes `rand_<n>.csv` under `out_dir`, one `a;b` line per
/// draw. Returns the written file's path.
pub fn emit_noise_sample(
    n: usize,
    params: &NoiseParams,
    seed: u32,
    out_dir: &Path,
) -> Result<std::path::PathBuf> {
    let mut rng = Mt19937::new(seed);
    let laplace = params.laplace();
    let geometric = params.geometric();

    let path = out_dir.join(format!("rand_{n}.csv"));
    let file = std::fs::File::create(&path).map_err(Error::OutputWriteError)?;
    let mut writer = std::io::BufWriter::new(file);

    for _ in 0..n {
        let a = laplace.sample(&mut rng);
        let b = geometric.sample(&mut rng);
        writeln!(writer, "{a};{b}").map_err(Error::OutputWriteError)?;
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_line_per_draw() {
        let dir = tempfile::tempdir().unwrap();
        let params = NoiseParams {
            dpf_mu: 0.0,
            dpf_b: 2.0,
            dpg_eps: 0.5,
        };
        let path = emit_noise_sample(10, &params, 42, dir.path()).unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 10);
        for line in contents.lines() {
            assert_eq!(line.split(';').count(), 2);
        }
    }

    #[test]
    fn same_seed_reproduces_the_same_draws() {
        let dir = tempfile::tempdir().unwrap();
        let params = NoiseParams {
            dpf_mu: 0.0,
            dpf_b: 2.0,
            dpg_eps: 0.5,
        };
        let a = emit_noise_sample(5, &params, 7, dir.path()).unwrap();
        let first = std::fs::read_to_string(&a).unwrap();
        std::fs::remove_file(&a).unwrap();
        let b = emit_noise_sample(5, &params, 7, dir.path()).unwrap();
        let second = std::fs::read_to_string(&b).unwrap();
        assert_eq!(first, second);
    }
}
