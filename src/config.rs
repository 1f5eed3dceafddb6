// Copyright (c) 2026-present, confly contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! JSON configuration (spec.md §6), grounded on
//! `examples/original_source/src/config.hpp`'s field names, defaults
//! and worker-partitioning arithmetic. Parsing the bytes off disk is
//! CLI-owned (`src/bin/confly.rs`); the struct and its validation live
//! here because the aggregation driver's public signature takes a
//! `Config` value directly.

use crate::error::{Error, Result};
use crate::rng::NoiseParams;
use crate::schema::{ColumnSpec, Schema};
use crate::value::ColumnType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `config.path`: every path the run touches.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PathConfig {
    pub dir_project: String,
    pub dir_output: String,
    pub file_ptable: String,
    pub file_input: String,
}

/// `config.prng`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PrngConfig {
    /// Engine name, for diagnostics; this crate only ever implements
    /// the Mersenne-Twister-class engine spec.md §4.6 mandates.
    pub engine: String,
    #[serde(default = "default_seed")]
    pub seed: u32,
    /// Number of draws the `--random` diagnostic emits per distribution.
    #[serde(default)]
    pub test: usize,
}

fn default_seed() -> u32 {
    42
}

/// `config.noise`. `ck_d`/`ck_var`/`ck_js` parameterise the *external*
/// P-table generator (spec.md §1: "the P-table itself is consumed...
/// generating it is external") and are carried here for configuration
/// fidelity; the aggregation engine itself only reads `dpf_mu`,
/// `dpf_b` and `dpg_eps`.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct NoiseConfig {
    #[serde(rename = "DPF_mu", default)]
    pub dpf_mu: f64,
    #[serde(rename = "DPF_b", default = "default_dpf_b")]
    pub dpf_b: f64,
    #[serde(rename = "DPG_eps", default = "default_dpg_eps")]
    pub dpg_eps: f64,
    #[serde(rename = "CK_D", default = "default_ck_d")]
    pub ck_d: f64,
    #[serde(rename = "CK_var", default = "default_ck_var")]
    pub ck_var: f64,
    #[serde(rename = "CK_js", default = "default_ck_js")]
    pub ck_js: f64,
}

fn default_dpf_b() -> f64 {
    2.0
}
fn default_dpg_eps() -> f64 {
    0.5
}
fn default_ck_d() -> f64 {
    3.0
}
fn default_ck_var() -> f64 {
    8.0
}
fn default_ck_js() -> f64 {
    1.0
}

impl NoiseConfig {
    pub fn to_noise_params(self) -> NoiseParams {
        NoiseParams {
            dpf_mu: self.dpf_mu,
            dpf_b: self.dpf_b,
            dpg_eps: self.dpg_eps,
        }
    }
}

/// One entry of `config.micro`: `[0]` is always the opaque record-id
/// column (its `type`/`cube` are ignored), `[1..]` are the category
/// columns that become [`Schema`]'s [`ColumnSpec`]s.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MicroColumn {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub cube: bool,
}

/// Resolves spec.md §9's Open Question ("whether workers should shift
/// `begin` by `worker_index * local_cubes` or by `worker_index`
/// alone is ambiguous"): `Block` implements the spec's chosen
/// convention and is the default; `Index` is exposed for operators
/// chasing source parity.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkerSeedMode {
    #[default]
    Block,
    Index,
}

/// The full configuration document (spec.md §6).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub path: PathConfig,
    #[serde(default)]
    pub machines: Vec<String>,
    #[serde(default = "default_rate")]
    pub rate: f64,
    /// Total number of cube replicas in the run ("size" in the JSON,
    /// matching `original_source`'s `_Cubes`).
    pub size: usize,
    #[serde(default)]
    pub begin: i64,
    pub prng: PrngConfig,
    pub noise: NoiseConfig,
    pub micro: Vec<MicroColumn>,
    #[serde(default)]
    pub worker_seed_mode: WorkerSeedMode,
}

fn default_rate() -> f64 {
    1.0
}

impl Config {
    /// Parses `bytes` as the JSON configuration document.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses the configuration from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            Error::ConfigMissingOrMalformed(format!("{}: {e}", path.display()))
        })?;
        Self::parse(&bytes)
    }

    fn validate(&self) -> Result<()> {
        if self.micro.len() < 2 {
            return Err(Error::ConfigMissingOrMalformed(
                "\"micro\" must list the record-id column plus at least one category column"
                    .to_string(),
            ));
        }
        for col in &self.micro[1..] {
            if ColumnType::from_config_str(&col.ty).is_none() {
                return Err(Error::ConfigMissingOrMalformed(format!(
                    "unknown micro column type {:?}",
                    col.ty
                )));
            }
        }
        if !(self.noise.dpg_eps > 0.0) {
            return Err(Error::ConfigMissingOrMalformed(format!(
                "noise.DPG_eps must be strictly positive, got {}",
                self.noise.dpg_eps
            )));
        }
        Ok(())
    }

    /// Builds the category-column [`Schema`] from `config.micro[1..]`.
    pub fn schema(&self) -> Result<Schema> {
        self.validate()?;
        let columns = self.micro[1..]
            .iter()
            .map(|c| {
                Ok(ColumnSpec {
                    name: String::new(),
                    ty: ColumnType::from_config_str(&c.ty).ok_or_else(|| {
                        Error::ConfigMissingOrMalformed(format!("unknown micro type {:?}", c.ty))
                    })?,
                    cube: c.cube,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Schema::new(columns))
    }

    pub fn noise_params(&self) -> NoiseParams {
        self.noise.to_noise_params()
    }

    /// `(local_cubes, first_cube_id)` for `worker_index` (`None` in
    /// single-worker mode), per spec.md §4.7 step 2.
    pub fn partition(&self, worker_index: Option<usize>) -> (usize, i64) {
        let total = self.size;
        let Some(idx) = worker_index else {
            return (total, self.begin);
        };

        let workers = self.machines.len().max(1);
        let block = total / workers;
        let local_cubes = if idx + 1 == workers {
            block + total % workers
        } else {
            block
        };

        let first_cube_id = match self.worker_seed_mode {
            WorkerSeedMode::Block => self.begin + (idx as i64) * block as i64,
            WorkerSeedMode::Index => self.begin + idx as i64,
        };

        (local_cubes, first_cube_id)
    }
}
