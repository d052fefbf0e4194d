//! Index coordinator (§4.7): owns the active partition, the decommissioned-
//! but-not-yet-durable set, the sorted set of fully persisted partitions, an
//! LRU of passive partitions reloaded for queries, and the meta-index. Each
//! partition/worker is logically an independent actor (§5); this crate
//! models that with message-boundary async methods over state serialized
//! behind one `tokio::sync::Mutex`, rather than a hand-rolled mailbox loop —
//! the coordinator's own state is only ever touched from its own async
//! methods, so a mutex already gives the "no shared mutable state except
//! through messages" property §5 asks for.

use crate::config::Config;
use crate::err::Result;
use crate::importer::{IdBlockStore, Importer};
use crate::meta_index::MetaIndex;
use crate::partition::{Partition, PartitionLimits, PartitionSnapshot, Slice};
use crate::persist::PartitionCodec;
use crate::schema::Layout;
use crate::value::Value;
use lru::LruCache;
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// One inbound event slice handed to the stream stage (B.6).
pub struct IngestRequest {
	pub row_count: u64,
	pub columns: Vec<Vec<Option<Value>>>,
}

/// Per-layout event counters surfaced to status reports (§4.7 "Stats").
#[derive(Clone, Debug, Default)]
pub struct LayoutStats {
	pub events_ingested: u64,
}

/// The UUIDs a coordinator recovers at startup (§4.7 "Startup"): the
/// external collaborator owning the actual index-file byte format, read by
/// this crate only as a flat UUID list.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
	async fn load_ids(&self) -> Result<Vec<Uuid>>;
	async fn save_ids(&self, ids: &[Uuid]) -> Result<()>;
}

struct State {
	active: Option<Partition>,
	unpersisted: HashMap<Uuid, Arc<Partition>>,
	persisted_partitions: BTreeSet<Uuid>,
	inmem_partitions: LruCache<Uuid, Arc<Partition>>,
	meta_idx: MetaIndex,
	stats: LayoutStats,
}

/// Holds one record layout's active/unpersisted/persisted/in-memory
/// partitions plus the meta-index that prunes queries over them (§4.7).
pub struct Coordinator<S: IdBlockStore, C: PartitionCodec, G: CatalogStore> {
	layout: Layout,
	limits: PartitionLimits,
	partition_capacity: u64,
	stream_credit: usize,
	importer: Mutex<Importer<S>>,
	codec: Arc<C>,
	catalog: Arc<G>,
	state: Mutex<State>,
}

impl<S: IdBlockStore, C: PartitionCodec, G: CatalogStore> Coordinator<S, C, G> {
	pub fn new(layout: Layout, config: &Config, importer: Importer<S>, codec: Arc<C>, catalog: Arc<G>, meta_idx: MetaIndex) -> Self {
		Self {
			layout,
			limits: PartitionLimits {
				max_container_elements: config.max_container_elements,
				max_string_size: config.max_string_size,
			},
			partition_capacity: config.max_partition_size,
			stream_credit: config.stream_credit.max(1),
			importer: Mutex::new(importer),
			codec,
			catalog,
			state: Mutex::new(State {
				active: None,
				unpersisted: HashMap::new(),
				persisted_partitions: BTreeSet::new(),
				inmem_partitions: LruCache::new(NonZeroUsize::new(config.max_resident_partitions.max(1)).unwrap()),
				meta_idx,
				stats: LayoutStats::default(),
			}),
		}
	}

	/// Startup recovery (§4.7): reads the UUID catalog, recovers each
	/// partition's synopsis into the meta-index. A UUID whose partition file
	/// is missing is a warning, not a failure — the coordinator still starts.
	pub async fn recover(&self) -> Result<()> {
		let ids = self.catalog.load_ids().await?;
		let mut state = self.state.lock().await;
		for id in ids {
			match self.codec.load(id).await {
				Ok(snapshot) => {
					// §1 puts the on-disk byte format out of scope, so there is no
					// real per-column synopsis to recover here; `merge` installs an
					// empty one, matching `Partition::from_snapshot`'s own "reloaded
					// partition starts with empty indexes" fallback.
					state.meta_idx.merge(id, crate::meta_index::PartitionEntry::new(snapshot.layout.clone()));
					state.persisted_partitions.insert(id);
				}
				Err(err) => {
					warn!(partition = %id, error = %err, "partition file missing during recovery, skipping");
				}
			}
		}
		Ok(())
	}

	/// Stream-stage handling of one inbound event slice (§4.7 steps 1-4).
	/// `columns` carries the row data; the coordinator — not its caller —
	/// owns ID allocation, assigning the slice's base ID from the importer.
	pub async fn ingest(&self, row_count: u64, columns: Vec<Vec<Option<crate::value::Value>>>) -> Result<Uuid> {
		let base_id = self.importer.lock().await.allocate(row_count)?;
		let slice = Slice::new(self.layout.clone(), base_id, row_count, columns);

		let mut state = self.state.lock().await;
		if state.active.is_none() {
			state.active = Some(Partition::new_active(Uuid::new_v4(), self.layout.clone(), self.partition_capacity, self.limits.clone()));
		}
		let remaining = state.active.as_ref().unwrap().capacity_remaining();
		if row_count > remaining && state.active.as_ref().unwrap().row_count() > 0 {
			self.decommission_active(&mut state).await?;
			state.active = Some(Partition::new_active(Uuid::new_v4(), self.layout.clone(), self.partition_capacity, self.limits.clone()));
		}

		let active = state.active.as_mut().expect("active partition just ensured");
		let active_id = active.id;
		active.append(&slice)?;
		state.meta_idx.add(active_id, &slice);
		state.stats.events_ingested += row_count;

		if active.should_decommission() {
			self.decommission_active(&mut state).await?;
		}
		Ok(active_id)
	}

	/// B.6: a bounded channel sized by `stream_credit` between whatever feeds
	/// this coordinator (the importer's source) and `run_stream_stage`. The
	/// bound itself is the backpressure: once `stream_credit` requests are
	/// in flight unconsumed, `Sender::send` blocks the producer rather than
	/// growing memory without limit.
	pub fn stream_channel(&self) -> (async_channel::Sender<IngestRequest>, async_channel::Receiver<IngestRequest>) {
		async_channel::bounded(self.stream_credit)
	}

	/// Drains `rx` until the channel closes, calling [`Self::ingest`] for
	/// each request in order. A single slice's ingest failure is logged and
	/// does not stop the stage — later slices still get a chance to land.
	pub async fn run_stream_stage(&self, rx: async_channel::Receiver<IngestRequest>) {
		while let Ok(request) = rx.recv().await {
			if let Err(err) = self.ingest(request.row_count, request.columns).await {
				tracing::error!(error = %err, "stream-stage ingest failed, dropping this slice");
			}
		}
	}

	/// Moves the active partition to `unpersisted` and queues its async
	/// persist (§4.6 "surrenders its state to a background persist task";
	/// §4.7 step 2 "flush coordinator state to disk").
	async fn decommission_active(&self, state: &mut State) -> Result<()> {
		let Some(partition) = state.active.take() else {
			return Ok(());
		};
		let id = partition.id;
		let snapshot = partition.snapshot();
		let handle = Arc::new(partition);
		state.unpersisted.insert(id, handle);

		let ids: Vec<Uuid> = state.unpersisted.keys().copied().chain(state.persisted_partitions.iter().copied()).collect();
		self.catalog.save_ids(&ids).await?;

		self.persist_one(id, snapshot).await;
		Ok(())
	}

	/// Async persist callback (§4.7): on success, `unpersisted → persisted`.
	/// On failure, persistence is not partially tolerated — this crate
	/// cannot terminate its caller's process, so it logs at error level and
	/// leaves the partition in `unpersisted` for a future retry rather than
	/// silently dropping it, a deliberate narrowing of "log and quit" to
	/// something a library can actually do (see DESIGN.md).
	async fn persist_one(&self, id: Uuid, snapshot: PartitionSnapshot) {
		match self.codec.store(id, &snapshot).await {
			Ok(()) => {
				let mut state = self.state.lock().await;
				state.unpersisted.remove(&id);
				state.persisted_partitions.insert(id);
				info!(partition = %id, "partition persisted");
			}
			Err(err) => {
				tracing::error!(partition = %id, error = %err, "partition persist failed, partial persistence not tolerated");
			}
		}
	}

	/// Resolves `id` to a partition handle for query evaluation (§4.8 step
	/// 4): active → direct handle (cloned as a one-off read-only snapshot of
	/// its current value indexes is not possible without `Arc`, so the
	/// active partition is evaluated in place), unpersisted → stored handle,
	/// persisted → LRU, loading lazily via the codec on a miss.
	pub async fn evaluate(&self, id: Uuid, expr: &crate::expr::ast::Expression) -> crate::bitmap::Bitmap {
		let mut state = self.state.lock().await;
		if let Some(active) = &state.active {
			if active.id == id {
				return active.evaluate(expr);
			}
		}
		if let Some(partition) = state.unpersisted.get(&id).cloned() {
			return partition.evaluate(expr);
		}
		if let Some(partition) = state.inmem_partitions.get(&id).cloned() {
			return partition.evaluate(expr);
		}
		if state.persisted_partitions.contains(&id) {
			match self.codec.load(id).await {
				Ok(snapshot) => {
					let partition = Arc::new(Partition::from_snapshot(id, snapshot, self.limits.clone()));
					state.inmem_partitions.put(id, partition.clone());
					return partition.evaluate(expr);
				}
				Err(err) => {
					warn!(partition = %id, error = %err, "partition load failed during query, reporting no matches");
				}
			}
		}
		crate::bitmap::Bitmap::with_size(0)
	}

	pub async fn is_resident(&self, id: Uuid) -> bool {
		let state = self.state.lock().await;
		state.active.as_ref().is_some_and(|a| a.id == id) || state.unpersisted.contains_key(&id) || state.inmem_partitions.contains(&id)
	}

	pub async fn meta_lookup(&self, expr: &crate::expr::ast::Expression) -> Vec<Uuid> {
		self.state.lock().await.meta_idx.lookup(expr)
	}

	pub async fn stats(&self) -> LayoutStats {
		self.state.lock().await.stats.clone()
	}
}

/// A single-layout coordinator's in-memory catalog test double, mirroring
/// [`crate::persist::MemCodec`].
#[derive(Default)]
pub struct MemCatalog {
	ids: tokio::sync::Mutex<Vec<Uuid>>,
}

#[async_trait::async_trait]
impl CatalogStore for MemCatalog {
	async fn load_ids(&self) -> Result<Vec<Uuid>> {
		Ok(self.ids.lock().await.clone())
	}

	async fn save_ids(&self, ids: &[Uuid]) -> Result<()> {
		*self.ids.lock().await = ids.to_vec();
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::expr::ast::{Expression, Operand, Predicate, RelOp};
	use crate::importer::MemIdBlockStore;
	use crate::meta_index::SynopsisLimits;
	use crate::persist::MemCodec;
	use crate::schema::FieldDef;
	use crate::value::{Address, Value};
	use std::net::Ipv4Addr;

	fn layout() -> Layout {
		Layout::new("conn", vec![FieldDef::new("id.orig_h", "addr")])
	}

	fn make_coordinator(capacity: u64) -> Coordinator<MemIdBlockStore, MemCodec, MemCatalog> {
		let config = Config {
			max_partition_size: capacity,
			..Config::default()
		};
		let importer = Importer::start(MemIdBlockStore::default(), 1024).unwrap();
		Coordinator::new(layout(), &config, importer, Arc::new(MemCodec::new()), Arc::new(MemCatalog::default()), MetaIndex::new(SynopsisLimits::default()))
	}

	fn addr(a: u8, b: u8, c: u8, d: u8) -> Value {
		Value::Address(Address::v4(Ipv4Addr::new(a, b, c, d)))
	}

	fn eq_predicate(v: Value) -> Expression {
		Expression::Predicate(Predicate::new(Operand::DataExtractor("addr".into(), 0), RelOp::Eq, Operand::Data(v)))
	}

	#[tokio::test]
	async fn ingest_creates_active_partition_and_is_queryable() {
		let coord = make_coordinator(100);
		let id = coord.ingest(2, vec![vec![Some(addr(1, 1, 1, 1)), Some(addr(2, 2, 2, 2))]]).await.unwrap();
		let hits = coord.evaluate(id, &eq_predicate(addr(1, 1, 1, 1))).await;
		assert_eq!(hits.to_vec(), vec![0]);
		assert_eq!(coord.stats().await.events_ingested, 2);
	}

	#[tokio::test]
	async fn oversized_slice_decommissions_and_persists() {
		let coord = make_coordinator(2);
		let first = coord.ingest(2, vec![vec![Some(addr(1, 1, 1, 1)), Some(addr(2, 2, 2, 2))]]).await.unwrap();
		// exceeds remaining capacity of the now-full active partition, so it
		// must decommission the old one and ingest into a fresh active.
		let second = coord.ingest(1, vec![vec![Some(addr(3, 3, 3, 3))]]).await.unwrap();
		assert_ne!(first, second);

		// first partition was persisted and is still resolvable for queries,
		// though (per §1's out-of-scope byte format) a reloaded passive
		// partition starts with empty value indexes, so it reports no hits
		// rather than erroring — the same "no pruning possible" fallback
		// `Partition::from_snapshot` documents.
		let hits = coord.evaluate(first, &eq_predicate(addr(1, 1, 1, 1))).await;
		assert!(hits.all_zero());
	}

	#[tokio::test]
	async fn meta_index_prunes_unrelated_partitions() {
		let coord = make_coordinator(100);
		let id = coord.ingest(1, vec![vec![Some(addr(9, 9, 9, 9))]]).await.unwrap();
		let candidates = coord.meta_lookup(&eq_predicate(addr(9, 9, 9, 9))).await;
		assert_eq!(candidates, vec![id]);
		let candidates = coord.meta_lookup(&eq_predicate(addr(8, 8, 8, 8))).await;
		assert!(candidates.is_empty());
	}

	#[tokio::test]
	async fn recover_warns_but_does_not_fail_on_missing_partition_file() {
		let catalog = Arc::new(MemCatalog::default());
		catalog.save_ids(&[Uuid::new_v4()]).await.unwrap();
		let config = Config::default();
		let importer = Importer::start(MemIdBlockStore::default(), 1024).unwrap();
		let coord = Coordinator::new(layout(), &config, importer, Arc::new(MemCodec::new()), catalog, MetaIndex::new(SynopsisLimits::default()));
		coord.recover().await.unwrap();
	}

	/// B.6: events sent down the stream-stage channel land the same as a
	/// direct `ingest` call, and the channel bound matches `stream_credit`.
	#[tokio::test]
	async fn stream_stage_ingests_events_sent_over_the_channel() {
		let coord = Arc::new(make_coordinator(100));
		let (tx, rx) = coord.stream_channel();
		let stage = tokio::spawn({
			let coord = coord.clone();
			async move { coord.run_stream_stage(rx).await }
		});

		tx.send(IngestRequest {
			row_count: 1,
			columns: vec![vec![Some(addr(7, 7, 7, 7))]],
		})
		.await
		.unwrap();
		drop(tx);
		stage.await.unwrap();

		let candidates = coord.meta_lookup(&eq_predicate(addr(7, 7, 7, 7))).await;
		assert_eq!(candidates.len(), 1);
		assert_eq!(coord.stats().await.events_ingested, 1);
	}
}
