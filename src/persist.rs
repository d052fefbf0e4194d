//! Persistence contract (§6, §4.6): `spec.md` §1 places the on-disk byte
//! format out of scope — the wire/file codec is an external collaborator.
//! This module defines only the shape of that collaborator: a trait the
//! coordinator calls to hand off a decommissioned partition, plus an
//! in-memory test double used by integration tests and benches.

use crate::err::Result;
use crate::partition::PartitionSnapshot;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Packs/unpacks partitions to whatever durable medium the deployment
/// chooses (§6 "format delegated to an external encoder"). Implementations
/// own the actual byte layout; this crate only calls `store`/`load`.
#[async_trait]
pub trait PartitionCodec: Send + Sync {
	async fn store(&self, id: Uuid, snapshot: &PartitionSnapshot) -> Result<()>;
	async fn load(&self, id: Uuid) -> Result<PartitionSnapshot>;
}

/// An in-memory stand-in for the real encoder (§1 Non-goal), used by tests
/// and benches that need a working `PartitionCodec` without touching disk.
#[derive(Default)]
pub struct MemCodec {
	store: Mutex<HashMap<Uuid, PartitionSnapshot>>,
}

impl MemCodec {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl PartitionCodec for MemCodec {
	async fn store(&self, id: Uuid, snapshot: &PartitionSnapshot) -> Result<()> {
		self.store.lock().unwrap().insert(id, snapshot.clone());
		Ok(())
	}

	async fn load(&self, id: Uuid) -> Result<PartitionSnapshot> {
		self.store
			.lock()
			.unwrap()
			.get(&id)
			.cloned()
			.ok_or_else(|| crate::err::Error::format_error(format!("no stored partition {id}")))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::schema::Layout;

	#[tokio::test]
	async fn round_trips_a_snapshot() {
		let codec = MemCodec::new();
		let id = Uuid::new_v4();
		let snapshot = PartitionSnapshot {
			layout: Layout::new("conn", vec![]),
			base_id: 0,
			row_count: 0,
		};
		codec.store(id, &snapshot).await.unwrap();
		let loaded = codec.load(id).await.unwrap();
		assert_eq!(loaded.layout, snapshot.layout);
	}

	#[tokio::test]
	async fn missing_partition_is_a_format_error() {
		let codec = MemCodec::new();
		assert!(codec.load(Uuid::new_v4()).await.is_err());
	}
}
