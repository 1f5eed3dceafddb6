// Copyright (c) 2026-present, confly contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The aggregation driver (component 8, spec.md §4.7): loads
//! microdata and the P-table, partitions cube replicas across this
//! worker, builds and emits each cube in parallel, and flushes the
//! traversing store.
//!
//! Parallelism follows `lsm_tree::verify::verify_version_with_options`:
//! the local cube indices are chunked `len.div_ceil(parallelism)` ways
//! and each chunk runs on its own `std::thread::spawn`'d thread, no
//! thread-pool crate. The per-cube RNG sub-stream makes the PRNG
//! conflict-free by construction (spec.md §5); the traversing store is
//! the only state threads share, held behind `Arc<Mutex<_>>` and
//! locked only for a cube's finalise-and-emit pass, never during its
//! (much longer) marginal-expansion accumulation.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::hypercube::Hypercube;
use crate::microdata::{Metadata, MicrodataStore};
use crate::ptable::PTable;
use crate::rng::{seed_for_cube, Mt19937, NoiseParams, Uniform};
use crate::schema::Schema;
use crate::traversing::TraversingStore;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

/// Per-run knobs that are not part of the persisted [`Config`] (CLI
/// flags and distribution-internal switches).
#[derive(Clone, Debug)]
pub struct AggregateOptions {
    /// Whether the traversing pass runs after all cubes are written
    /// (`--no-traverse` maps to `false`).
    pub traverse: bool,
    /// `None` in single-worker mode; `Some(index)` when this call is
    /// one shard of a `--distribute` run.
    pub worker_index: Option<usize>,
    /// The field separator used for microdata, cube and P-table files.
    pub sep: char,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            traverse: true,
            worker_index: None,
            sep: ';',
        }
    }
}

/// One cube that failed to write — aggregation continues with the
/// rest (spec.md §7: "per-cube errors are logged but the remaining
/// cubes proceed").
#[derive(Debug)]
pub struct CubeFailure {
    pub cube_id: i64,
    pub error: Error,
}

/// Outcome of a local [`aggregate`] run.
#[derive(Debug, Default)]
pub struct AggregateOutcome {
    pub cubes_written: usize,
    pub failures: Vec<CubeFailure>,
}

/// Runs the aggregation engine for this worker and writes its share of
/// cube files (and, if `options.traverse`, the traversing files) under
/// `out_dir`.
pub fn aggregate(config: &Config, out_dir: &Path, options: &AggregateOptions) -> Result<AggregateOutcome> {
    let schema = config.schema()?;
    let mask = schema.aggregation_mask();

    log::debug!("loading microdata from {}", config.path.file_input);
    let micro_file = File::open(&config.path.file_input).map_err(Error::MicroReadError)?;
    let mut ingest_rng = Mt19937::new(config.prng.seed);
    let store = MicrodataStore::ingest(
        schema.clone(),
        mask,
        std::io::BufReader::new(micro_file),
        options.sep,
        &mut ingest_rng,
    )?;
    log::debug!("ingested {} records", store.records().len());

    log::debug!("loading p-table from {}", config.path.file_ptable);
    let ptable_file = File::open(&config.path.file_ptable)
        .map_err(|e| Error::PTableReadError(e.to_string()))?;
    let ptable = Arc::new(PTable::load(std::io::BufReader::new(ptable_file))?);
    let noise = config.noise_params();

    let (local_cubes, first_cube_id) = config.partition(options.worker_index);
    log::info!(
        "worker {:?}: {local_cubes} local cubes starting at {first_cube_id}",
        options.worker_index
    );

    let traversing = if options.traverse {
        Some(Arc::new(Mutex::new(TraversingStore::new(local_cubes))))
    } else {
        None
    };

    let sample_count = ((config.rate * store.records().len() as f64).round() as usize)
        .min(store.records().len());

    let parallelism = thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
        .min(local_cubes.max(1));
    let chunk_size = local_cubes.div_ceil(parallelism.max(1)).max(1);

    let schema = Arc::new(schema);
    let meta = Arc::new(store.metadata().clone());
    let records = Arc::new(store.records().to_vec());
    let out_dir = Arc::new(out_dir.to_path_buf());

    let results: Arc<Mutex<Vec<(i64, Result<()>)>>> = Arc::new(Mutex::new(Vec::with_capacity(local_cubes)));

    let indices: Vec<usize> = (0..local_cubes).collect();
    let handles: Vec<_> = indices
        .chunks(chunk_size)
        .map(|chunk| {
            let chunk = chunk.to_vec();
            let schema = Arc::clone(&schema);
            let meta = Arc::clone(&meta);
            let records = Arc::clone(&records);
            let ptable = Arc::clone(&ptable);
            let traversing = traversing.clone();
            let out_dir = Arc::clone(&out_dir);
            let results = Arc::clone(&results);
            let base_seed = config.prng.seed;
            let sep = options.sep;

            thread::spawn(move || {
                for cube_id in chunk {
                    let global_id = first_cube_id + cube_id as i64;
                    let outcome = compute_cube(
                        cube_id,
                        global_id,
                        &schema,
                        mask,
                        &records,
                        sample_count,
                        &meta,
                        &ptable,
                        &noise,
                        seed_for_cube(base_seed, first_cube_id, cube_id as u64),
                        sep,
                        &out_dir,
                        traversing.as_ref(),
                    );
                    results
                        .lock()
                        .expect("results lock poisoned")
                        .push((global_id, outcome));
                }
            })
        })
        .collect();

    for handle in handles {
        let _ = handle.join();
    }

    let mut outcome = AggregateOutcome::default();
    for (global_id, result) in Arc::try_unwrap(results)
        .expect("all worker threads joined")
        .into_inner()
        .expect("results lock poisoned")
    {
        match result {
            Ok(()) => outcome.cubes_written += 1,
            Err(error) => {
                log::warn!("cube {global_id}: {error}");
                outcome.failures.push(CubeFailure {
                    cube_id: global_id,
                    error,
                });
            }
        }
    }

    if let Some(store) = traversing {
        let store = Arc::try_unwrap(store)
            .map_err(|_| ())
            .expect("all worker threads joined")
            .into_inner()
            .expect("traversing store lock poisoned");
        log::debug!("flushing traversing store ({} coordinates)", store.coordinate_count());
        store.flush(&out_dir)?;
    }

    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
fn compute_cube(
    cube_id: usize,
    global_id: i64,
    schema: &Schema,
    mask: u64,
    records: &[crate::microdata::Record],
    sample_count: usize,
    meta: &Metadata,
    ptable: &PTable,
    noise: &NoiseParams,
    seed: u32,
    sep: char,
    out_dir: &PathBuf,
    traversing: Option<&Arc<Mutex<TraversingStore>>>,
) -> Result<()> {
    let mut rng = Mt19937::new(seed);
    let mut cube = Hypercube::new(cube_id, mask);

    for idx in sample_without_replacement(records.len(), sample_count, &mut rng) {
        let record = &records[idx];
        cube.update(schema, &record.categories, record.rkey_fraction());
    }

    let path = out_dir.join(format!("cube_{global_id}.csv"));
    let file = File::create(&path).map_err(Error::OutputWriteError)?;
    let mut writer = BufWriter::new(file);

    match traversing {
        Some(store) => {
            let mut guard = store.lock().expect("traversing store lock poisoned");
            cube.finalise_and_emit(schema, meta, ptable, noise, &mut rng, sep, &mut writer, Some(&mut *guard))
        }
        None => cube.finalise_and_emit(schema, meta, ptable, noise, &mut rng, sep, &mut writer, None),
    }
}

/// Draws `count` *distinct* indices in `0..len` uniformly without
/// replacement (spec.md §4.7 step 5), by rejection sampling — simple
/// and exact, and cheap enough at the sampling rates this engine
/// targets (rejecting becomes expensive only as `count` approaches
/// `len`, which `rate <= 1.0` bounds in practice).
fn sample_without_replacement(len: usize, count: usize, rng: &mut Mt19937) -> Vec<usize> {
    if len == 0 || count == 0 {
        return Vec::new();
    }
    let uniform = Uniform::<usize>::new(0, len);
    let mut chosen = BTreeSet::new();
    while chosen.len() < count.min(len) {
        chosen.insert(uniform.sample(rng));
    }
    chosen.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_without_replacement_never_repeats_and_respects_bound() {
        let mut rng = Mt19937::new(1);
        let picked = sample_without_replacement(5, 5, &mut rng);
        let set: BTreeSet<_> = picked.iter().copied().collect();
        assert_eq!(set.len(), 5);
        assert_eq!(set, (0..5).collect());
    }

    #[test]
    fn sample_without_replacement_caps_at_population_size() {
        let mut rng = Mt19937::new(1);
        let picked = sample_without_replacement(3, 100, &mut rng);
        assert_eq!(picked.len(), 3);
    }

    #[test]
    fn sample_without_replacement_empty_population_yields_nothing() {
        let mut rng = Mt19937::new(1);
        assert!(sample_without_replacement(0, 5, &mut rng).is_empty());
    }
}
