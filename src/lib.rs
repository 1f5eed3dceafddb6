// Copyright (c) 2026-present, confly contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A statistical-disclosure-control aggregator: it folds microdata into
//! a hypercube of marginal tables, perturbs every cell with one of two
//! noise mechanisms (Cell-Key bounded noise via a P-table lookup, or
//! parametric Laplace/Geometric differential-privacy noise), and
//! writes the result as one CSV per cube replica.
//!
//! ##### About
//!
//! A *cube* is a full marginal expansion of the category columns in a
//! microdata table, keyed by an *aggregation mask* that decides which
//! columns are always totaled and which vary freely across marginals.
//! A *run* draws one or more independent cube replicas (each with its
//! own pseudo-random sub-stream) over the same microdata, optionally
//! sharded across worker machines, and optionally folds every
//! replica's output back through a *traversing store* that tracks one
//! record per coordinate tuple across all cubes.
//!
//! The pipeline, in order:
//!
//! 1. [`schema`] and [`value`] describe the category columns and the
//!    tagged-union cell values they hold.
//! 2. [`config`] parses the run's JSON configuration document.
//! 3. [`microdata`] ingests raw rows, drawing each a record-key and
//!    accumulating per-column category metadata.
//! 4. [`ptable`] loads the externally generated Cell-Key P-table.
//! 5. [`rng`] is the deterministic Mersenne-Twister engine and the
//!    uniform/Laplace/Geometric samplers built on it.
//! 6. [`hypercube`] performs the marginal expansion and noise
//!    finalisation for one cube replica.
//! 7. [`traversing`] folds finalised cells across cube replicas by
//!    coordinate.
//! 8. [`driver`] orchestrates a single worker's share of a run.
//! 9. [`distribute`] fans a run out across worker machines and reduces
//!    their output.
//! 10. [`diagnostics`] draws and writes a noise-parameter sample
//!     independent of any aggregation run.
//!
//! # Example
//!
//! ```no_run
//! use confly::config::Config;
//! use confly::driver::{aggregate, AggregateOptions};
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("confly.json"))?;
//! let outcome = aggregate(&config, Path::new("out"), &AggregateOptions::default())?;
//! assert!(outcome.failures.is_empty());
//! # Ok::<(), confly::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod diagnostics;
pub mod distribute;
pub mod driver;
mod error;
pub mod hypercube;
pub mod microdata;
pub mod ptable;
pub mod response;
pub mod rng;
pub mod schema;
pub mod traversing;
pub mod tuple;
pub mod value;

pub use error::{Error, Result};
