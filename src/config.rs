//! Runtime configuration (§6 recognized keys, A.3). Loading a config file or
//! environment into this struct is an external collaborator's job (§1); this
//! crate only defines the typed shape and validates the values it receives,
//! the way the teacher's `cnf` module exposes `pub const`/`Lazy` defaults
//! without itself parsing a config file.

use crate::err::{Error, Result};
use serde::Deserialize;

pub const DEFAULT_MAX_PARTITION_SIZE: u64 = 1 << 20;
pub const DEFAULT_MAX_RESIDENT_PARTITIONS: usize = 128;
pub const DEFAULT_TASTE_PARTITIONS: usize = 8;
pub const DEFAULT_MAX_QUERIES: usize = 64;
pub const DEFAULT_META_INDEX_FP_RATE: f64 = 0.01;
pub const DEFAULT_ADDRESS_SYNOPSIS_FP_RATE: f64 = 0.01;
pub const DEFAULT_STRING_SYNOPSIS_FP_RATE: f64 = 0.01;
pub const DEFAULT_MAX_CONTAINER_ELEMENTS: usize = 256;
pub const DEFAULT_MAX_STRING_SIZE: usize = 256;
pub const DEFAULT_TELEMETRY_RATE_SECS: u64 = 60;
/// ID block size reserved per importer restart (§5 "default 8 Mi IDs").
pub const DEFAULT_ID_BLOCK_SIZE: u64 = 8 * 1024 * 1024;
/// Bounded credit between the importer and the coordinator's stream stage
/// (B.6: not named in §6, supplements it).
pub const DEFAULT_STREAM_CREDIT: usize = 64;
/// Per-partition evaluation timeout (B.7: supplements §6).
pub const DEFAULT_PARTITION_EVAL_TIMEOUT_MS: u64 = 30_000;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
	#[serde(rename = "max-partition-size")]
	pub max_partition_size: u64,
	#[serde(rename = "max-resident-partitions")]
	pub max_resident_partitions: usize,
	#[serde(rename = "taste-partitions")]
	pub taste_partitions: usize,
	#[serde(rename = "max-queries")]
	pub max_queries: usize,
	#[serde(rename = "meta-index-fp-rate")]
	pub meta_index_fp_rate: f64,
	#[serde(rename = "address-synopsis-fp-rate")]
	pub address_synopsis_fp_rate: f64,
	#[serde(rename = "string-synopsis-fp-rate")]
	pub string_synopsis_fp_rate: f64,
	#[serde(rename = "max-container-elements")]
	pub max_container_elements: usize,
	#[serde(rename = "max-string-size")]
	pub max_string_size: usize,
	#[serde(rename = "db-directory")]
	pub db_directory: String,
	#[serde(rename = "telemetry-rate")]
	pub telemetry_rate_secs: u64,
	#[serde(rename = "id-block-size")]
	pub id_block_size: u64,
	pub stream_credit: usize,
	pub partition_eval_timeout_ms: u64,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			max_partition_size: DEFAULT_MAX_PARTITION_SIZE,
			max_resident_partitions: DEFAULT_MAX_RESIDENT_PARTITIONS,
			taste_partitions: DEFAULT_TASTE_PARTITIONS,
			max_queries: DEFAULT_MAX_QUERIES,
			meta_index_fp_rate: DEFAULT_META_INDEX_FP_RATE,
			address_synopsis_fp_rate: DEFAULT_ADDRESS_SYNOPSIS_FP_RATE,
			string_synopsis_fp_rate: DEFAULT_STRING_SYNOPSIS_FP_RATE,
			max_container_elements: DEFAULT_MAX_CONTAINER_ELEMENTS,
			max_string_size: DEFAULT_MAX_STRING_SIZE,
			db_directory: "./db".into(),
			telemetry_rate_secs: DEFAULT_TELEMETRY_RATE_SECS,
			id_block_size: DEFAULT_ID_BLOCK_SIZE,
			stream_credit: DEFAULT_STREAM_CREDIT,
			partition_eval_timeout_ms: DEFAULT_PARTITION_EVAL_TIMEOUT_MS,
		}
	}
}

impl Config {
	/// Rejects values that would make the rest of the crate misbehave rather
	/// than merely perform badly (zero-sized worker pool, impossible FP
	/// rates, …).
	pub fn validate(&self) -> Result<()> {
		if self.max_partition_size == 0 {
			return Err(Error::invalid_query("max-partition-size must be > 0"));
		}
		if self.max_queries == 0 {
			return Err(Error::invalid_query("max-queries must be > 0"));
		}
		for (name, rate) in [
			("meta-index-fp-rate", self.meta_index_fp_rate),
			("address-synopsis-fp-rate", self.address_synopsis_fp_rate),
			("string-synopsis-fp-rate", self.string_synopsis_fp_rate),
		] {
			if !(0.0..1.0).contains(&rate) {
				return Err(Error::invalid_query(format!("{name} must be in (0, 1)")));
			}
		}
		if self.max_container_elements == 0 {
			return Err(Error::invalid_query("max-container-elements must be > 0"));
		}
		if self.max_string_size == 0 {
			return Err(Error::invalid_query("max-string-size must be > 0"));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_validate() {
		Config::default().validate().unwrap();
	}

	#[test]
	fn zero_partition_size_is_rejected() {
		let mut cfg = Config::default();
		cfg.max_partition_size = 0;
		assert!(cfg.validate().is_err());
	}

	#[test]
	fn out_of_range_fp_rate_is_rejected() {
		let mut cfg = Config::default();
		cfg.address_synopsis_fp_rate = 1.5;
		assert!(cfg.validate().is_err());
	}
}
