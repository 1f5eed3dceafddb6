// Copyright (c) 2026-present, confly contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! CLI entry point (spec.md §6), `cli` feature only. Argument parsing
//! and tracing setup follow `lsm_tree::tool`'s shape; the subcommands
//! themselves are thin wrappers over `confly::driver`,
//! `confly::distribute` and `confly::diagnostics`.

use clap::{ArgAction, Parser};
use confly::config::Config;
use confly::distribute::reduce;
use confly::driver::{aggregate, AggregateOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

// spec.md §6: "Exit code: 0 always, with diagnostics on stderr/stdout."
// `die!` prints and returns early, but never with a non-zero code.
macro_rules! die {
    ($fmt:literal, $($arg:tt)*) => {{
        eprintln!($fmt, $($arg)*);
        return ExitCode::SUCCESS;
    }};

    ($msg:literal) => {{
        eprintln!($msg);
        return ExitCode::SUCCESS;
    }};
}

/// A statistical-disclosure-control aggregator producing perturbed
/// hypercube marginals.
#[derive(Parser, Debug)]
#[command(name = "confly", version, about)]
struct Args {
    /// Path to the JSON configuration document.
    #[arg(long, default_value = "config.json")]
    conf: PathBuf,

    /// Run local aggregation.
    #[arg(long, action = ArgAction::SetTrue)]
    aggregate: bool,

    /// Skip the traversing pass after `--aggregate` (or `--distribute`).
    #[arg(long, action = ArgAction::SetTrue)]
    no_traverse: bool,

    /// Fan out aggregation across the configured worker machines.
    #[arg(long, action = ArgAction::SetTrue)]
    distribute: bool,

    /// Reduce existing cube files from the output path into traversing
    /// files, without running aggregation.
    #[arg(long, action = ArgAction::SetTrue)]
    traverse: bool,

    /// Generate the P-table via an external scripting collaborator.
    /// Out of scope for this crate (spec.md §1): the P-table is
    /// consumed, not generated. Present so existing invocations that
    /// pass the flag fail with a clear message instead of "unknown
    /// argument".
    #[arg(long, action = ArgAction::SetTrue)]
    ptable: bool,

    /// Emit a noise-diagnostic CSV (`rand_<n>.csv`) and exit.
    #[arg(long, action = ArgAction::SetTrue)]
    random: bool,

    /// Number of draws for `--random`; falls back to `config.prng.test`
    /// and then 1000 when unset.
    #[arg(long)]
    test: Option<usize>,

    /// Turn on verbose output. Supply multiple times to increase verbosity.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except for errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

fn init_tracing(quiet: bool, verbose: u8) -> LevelFilter {
    let level_filter = if quiet {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    tracing_log::LogTracer::init().expect("failed to set log tracer");

    let registry = Registry::default();
    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("CONFLY_LOG")
        .from_env_lossy();

    let subscriber = registry.with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .compact(),
    );

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("INTERNAL ERROR: setting default tracing::subscriber failed");
    }

    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing_panic::panic_hook(info);
        prev_hook(info);
    }));

    level_filter
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level_filter = init_tracing(args.quiet, args.verbose);
    info!(
        "starting confly {} (log level: {level_filter})",
        env!("CARGO_PKG_VERSION")
    );

    if args.ptable {
        die!(
            "{}",
            "--ptable is not implemented by this crate: the P-table is consumed, not generated (see spec.md). Produce it with the external scripting collaborator and point --conf's path.file_ptable at the result."
        );
    }

    let config = match Config::load(&args.conf) {
        Ok(config) => config,
        Err(e) => die!("failed to load {}: {e}", args.conf.display()),
    };

    if args.random {
        let n = args.test.filter(|n| *n > 0).unwrap_or_else(|| {
            if config.prng.test > 0 {
                config.prng.test
            } else {
                1000
            }
        });
        let out_dir = PathBuf::from(&config.path.dir_output);
        return match confly::diagnostics::emit_noise_sample(
            n,
            &config.noise_params(),
            config.prng.seed,
            &out_dir,
        ) {
            Ok(path) => {
                info!("wrote {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => die!("{e}"),
        };
    }

    if args.distribute {
        die!(
            "{}",
            "--distribute requires a concrete Worker transport, which this binary does not wire up by default; use confly::distribute::distribute from a custom binary or integration harness."
        );
    }

    if args.traverse {
        let out_dir = PathBuf::from(&config.path.dir_output);
        return match reduce(&config, &out_dir, &out_dir, ';') {
            Ok(store) => {
                info!("reduced {} coordinates", store.coordinate_count());
                ExitCode::SUCCESS
            }
            Err(e) => die!("traversing reduce failed: {e}"),
        };
    }

    if args.aggregate {
        let out_dir = PathBuf::from(&config.path.dir_output);
        if let Err(e) = std::fs::create_dir_all(&out_dir) {
            die!("failed to create {}: {e}", out_dir.display());
        }
        let options = AggregateOptions {
            traverse: !args.no_traverse,
            worker_index: None,
            sep: ';',
        };
        return match aggregate(&config, &out_dir, &options) {
            Ok(outcome) => {
                info!(
                    "wrote {} cubes, {} failures",
                    outcome.cubes_written,
                    outcome.failures.len()
                );
                for failure in &outcome.failures {
                    error!("cube {}: {}", failure.cube_id, failure.error);
                }
                ExitCode::SUCCESS
            }
            Err(e) => die!("aggregation failed: {e}"),
        };
    }

    eprintln!("nothing to do: pass --aggregate, --distribute, --traverse or --random");
    ExitCode::SUCCESS
}
