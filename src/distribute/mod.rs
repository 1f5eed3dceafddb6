// Copyright (c) 2026-present, confly contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The distribution driver (component 9, spec.md §4.9): fans the same
//! configuration out to a list of workers, each running the
//! equivalent of [`crate::driver::aggregate`] with traversing
//! suppressed, then optionally reduces their cube files into local
//! traversing output.
//!
//! The core never sees the transport (spec.md §9's "`Worker`
//! capability" design note): it only calls [`Worker::run`] and
//! inspects its `Result`. Production callers plug in a real transport
//! (ssh2, an HTTPS RPC client, a local subprocess); tests use an
//! in-process mock.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::hypercube::Hypercube;
use crate::traversing::TraversingStore;
use std::path::Path;
use std::sync::Mutex;
use std::thread;

/// Abstract execution target hosting one aggregate-shard sub-run
/// (spec.md §9). Implementors execute `command` on `self` and return
/// its standard output, or an error describing why the worker could
/// not be reached.
pub trait Worker: Send + Sync {
    /// The hostname this worker was configured with (used in
    /// diagnostics and in the first-line marker check, spec.md §4.9
    /// step 4).
    fn hostname(&self) -> &str;

    /// Runs `command` on the worker and returns its stdout.
    fn run(&self, command: &str) -> std::result::Result<String, String>;
}

/// Outcome of one worker's shard.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub hostname: String,
    pub stdout: String,
}

/// Runs `config`'s aggregation across `workers`, one worker per
/// configured machine (spec.md §4.9).
///
/// `command_for` builds the remote command line for a given worker
/// index — callers own the concrete shape (e.g. `confly --aggregate
/// --conf ... --no-traverse`); this function only orchestrates fan-out,
/// the first-line hostname marker, and failure semantics.
pub fn distribute<W: Worker>(
    config: &Config,
    workers: &[W],
    command_for: impl Fn(usize) -> String,
) -> Result<Vec<WorkerOutcome>> {
    if workers.len() > config.size {
        return Err(Error::ConfigMissingOrMalformed(format!(
            "{} workers configured for only {} cubes",
            workers.len(),
            config.size
        )));
    }

    // Built up front on this thread: `command_for` need not be `Sync`,
    // and every scoped thread below only needs to borrow its own slot.
    let commands: Vec<String> = (0..workers.len()).map(&command_for).collect();

    // Run every worker concurrently; the first `WorkerUnreachable`
    // aborts the whole run (spec.md §7: "other workers' results are
    // not partial-committed — callers must retry"). Scoped so `&W` can
    // be shared with the threads without requiring `W: 'static`.
    let results: Mutex<Vec<(usize, std::result::Result<WorkerOutcome, Error>)>> =
        Mutex::new(Vec::with_capacity(workers.len()));

    thread::scope(|scope| {
        for (idx, worker) in workers.iter().enumerate() {
            let command = &commands[idx];
            let results = &results;
            scope.spawn(move || {
                let hostname = worker.hostname().to_string();
                log::info!("dispatching worker {hostname}: {command}");
                let outcome = match worker.run(command) {
                    Ok(stdout) => Ok(WorkerOutcome {
                        stdout: strip_hostname_marker(&hostname, stdout),
                        hostname,
                    }),
                    Err(reason) => Err(Error::WorkerUnreachable { host: hostname, reason }),
                };
                results.lock().expect("results lock poisoned").push((idx, outcome));
            });
        }
    });

    let mut outcomes = results.into_inner().expect("results lock poisoned");
    outcomes.sort_by_key(|(idx, _)| *idx);
    outcomes.into_iter().map(|(_, outcome)| outcome).collect()
}

/// Checks the worker's first line of output against its configured
/// hostname (§4.9 step 4's marker check — guards against a transport
/// that silently hands back another host's stdout) and strips it from
/// the returned command output. A missing or mismatched marker is
/// logged, not fatal: only a transport-level `Err` from `Worker::run`
/// aborts the run.
fn strip_hostname_marker(hostname: &str, stdout: String) -> String {
    match stdout.split_once('\n') {
        Some((marker, rest)) if marker == hostname => rest.to_string(),
        Some((marker, _)) => {
            log::warn!(
                "worker {hostname} returned mismatched hostname marker {marker:?}; keeping full output"
            );
            stdout
        }
        None => {
            log::warn!("worker {hostname} returned no hostname marker");
            stdout
        }
    }
}

/// Step 5 of spec.md §4.9: read every produced cube file, reconstruct
/// cubes via read-back, and write traversing files locally. Explicitly
/// sequential (spec.md §5: parallelising read-back would require
/// per-cube scratch maps merged at a barrier, which is permitted but
/// not required).
pub fn reduce(
    config: &Config,
    cube_dir: &Path,
    out_dir: &Path,
    sep: char,
) -> Result<TraversingStore> {
    let schema = config.schema()?;
    let mask = schema.aggregation_mask();
    let mut store = TraversingStore::new(config.size);

    for cube_id in 0..config.size {
        let global_id = config.begin + cube_id as i64;
        let path = cube_dir.join(format!("cube_{global_id}.csv"));
        let file = std::fs::File::open(&path)
            .map_err(|e| Error::CubeReadError(format!("{}: {e}", path.display())))?;
        let cube = Hypercube::read_back(
            &schema,
            cube_id,
            mask,
            std::io::BufReader::new(file),
            sep,
        )?;
        for (coord, response) in cube.into_cells() {
            store.insert(cube_id, coord, response);
        }
    }

    store.flush(out_dir)?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MicroColumn, NoiseConfig, PathConfig, PrngConfig};

    struct MockWorker {
        hostname: String,
    }

    impl Worker for MockWorker {
        fn hostname(&self) -> &str {
            &self.hostname
        }

        fn run(&self, command: &str) -> std::result::Result<String, String> {
            Ok(format!("{}\nok: {command}", self.hostname))
        }
    }

    fn sample_config(size: usize, machines: Vec<String>) -> Config {
        Config {
            path: PathConfig {
                dir_project: "/p".into(),
                dir_output: "/o".into(),
                file_ptable: "/pt".into(),
                file_input: "/in".into(),
            },
            machines,
            rate: 1.0,
            size,
            begin: 0,
            prng: PrngConfig {
                engine: "mt19937".into(),
                seed: 42,
                test: 0,
            },
            noise: NoiseConfig {
                dpf_mu: 0.0,
                dpf_b: 2.0,
                dpg_eps: 0.5,
                ck_d: 3.0,
                ck_var: 8.0,
                ck_js: 1.0,
            },
            micro: vec![
                MicroColumn { ty: "string".into(), cube: true },
                MicroColumn { ty: "int".into(), cube: true },
            ],
            worker_seed_mode: crate::config::WorkerSeedMode::Block,
        }
    }

    #[test]
    fn rejects_more_workers_than_cubes() {
        let config = sample_config(2, vec!["a".into(), "b".into(), "c".into()]);
        let workers = vec![
            MockWorker { hostname: "a".into() },
            MockWorker { hostname: "b".into() },
            MockWorker { hostname: "c".into() },
        ];
        let err = distribute(&config, &workers, |_| "confly --aggregate".into()).unwrap_err();
        assert!(matches!(err, Error::ConfigMissingOrMalformed(_)));
    }

    #[test]
    fn dispatches_one_command_per_worker() {
        let config = sample_config(10, vec!["a".into(), "b".into()]);
        let workers = vec![
            MockWorker { hostname: "a".into() },
            MockWorker { hostname: "b".into() },
        ];
        let outcomes = distribute(&config, &workers, |idx| format!("confly --aggregate --shard {idx}")).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].stdout, "ok: confly --aggregate --shard 0");
        assert_eq!(outcomes[1].stdout, "ok: confly --aggregate --shard 1");
    }

    struct UnreachableWorker {
        hostname: String,
    }

    impl Worker for UnreachableWorker {
        fn hostname(&self) -> &str {
            &self.hostname
        }

        fn run(&self, _command: &str) -> std::result::Result<String, String> {
            Err("connection refused".into())
        }
    }

    #[test]
    fn an_unreachable_worker_aborts_the_whole_run() {
        let config = sample_config(10, vec!["a".into(), "b".into()]);
        let workers = vec![
            UnreachableWorker { hostname: "a".into() },
            UnreachableWorker { hostname: "b".into() },
        ];
        let err = distribute(&config, &workers, |_| "confly --aggregate".into()).unwrap_err();
        match err {
            Error::WorkerUnreachable { host, reason } => {
                assert_eq!(host, "a");
                assert_eq!(reason, "connection refused");
            }
            other => panic!("expected WorkerUnreachable, got {other:?}"),
        }
    }
}
