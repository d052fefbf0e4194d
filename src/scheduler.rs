//! Query scheduler (§4.8): admits a query against meta-index candidates,
//! pages through them under a bounded worker pool, and supports mid-flight
//! cancellation. Driving the "no idle worker goes unused while a query has
//! remaining partitions" loop (§4.8 worker pool discipline) is the
//! coordinator's job — this module guarantees each individual admission/
//! paging/cancellation step is correct; repeatedly calling `schedule` as
//! workers free up is how the coordinator gets progress without starvation.

use crate::bitmap::Bitmap;
use crate::expr::ast::Expression;
use crate::expr::normalize;
use crate::meta_index::MetaIndex;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::warn;
use uuid::Uuid;

/// Resolves a partition UUID to an evaluator (§4.8 step 4: active → direct
/// handle, unpersisted → stored handle, persisted → LRU, loading lazily).
#[async_trait]
pub trait PartitionLookup: Send + Sync {
	async fn evaluate(&self, id: Uuid, expr: &Expression) -> Bitmap;

	/// Whether `id` is already resident in memory, used to order
	/// `remaining_partitions` (loaded candidates first, §4.8 step 3).
	fn is_resident(&self, id: Uuid) -> bool;
}

struct QueryState {
	expr: Expression,
	remaining: VecDeque<Uuid>,
}

/// Admits and pages queries over a bounded pool of `num_workers` concurrent
/// per-partition evaluations.
pub struct Scheduler<L: PartitionLookup> {
	lookup: Arc<L>,
	workers: Arc<Semaphore>,
	taste_partitions: usize,
	eval_timeout: Duration,
	pending: Mutex<HashMap<Uuid, QueryState>>,
}

impl<L: PartitionLookup> Scheduler<L> {
	pub fn new(lookup: Arc<L>, num_workers: usize, taste_partitions: usize) -> Self {
		Self::with_timeout(lookup, num_workers, taste_partitions, Duration::from_millis(crate::config::DEFAULT_PARTITION_EVAL_TIMEOUT_MS))
	}

	/// B.7: bounds each worker's per-partition evaluation call so one slow or
	/// stuck partition load cannot stall the whole worker pool indefinitely.
	pub fn with_timeout(lookup: Arc<L>, num_workers: usize, taste_partitions: usize, eval_timeout: Duration) -> Self {
		Self {
			lookup,
			workers: Arc::new(Semaphore::new(num_workers.max(1))),
			taste_partitions,
			eval_timeout,
			pending: Mutex::new(HashMap::new()),
		}
	}

	/// Query admission (§4.8): `lookup(expr) → (query_id, total, scheduled)`.
	/// Candidates are ordered resident-first (stable within each group) so
	/// the first `schedule` call prefers partitions already in memory. Does
	/// not itself evaluate anything — the caller self-delegates a
	/// `schedule(query_id, scheduled)` call next, matching §4.8 step 4.
	pub async fn admit(&self, meta_idx: &MetaIndex, expr: Expression) -> (Uuid, usize, usize) {
		let normalized = normalize(expr);
		let candidates = meta_idx.lookup(&normalized);
		if candidates.is_empty() {
			return (Uuid::nil(), 0, 0);
		}
		let (resident, rest): (Vec<Uuid>, Vec<Uuid>) = candidates.into_iter().partition(|id| self.lookup.is_resident(*id));
		let total = resident.len() + rest.len();
		let mut remaining = VecDeque::with_capacity(total);
		remaining.extend(resident);
		remaining.extend(rest);
		let scheduled = self.taste_partitions.min(total);

		let mut pending = self.pending.lock().await;
		let query_id = loop {
			let candidate = Uuid::new_v4();
			if candidate != Uuid::nil() && !pending.contains_key(&candidate) {
				break candidate;
			}
		};
		pending.insert(
			query_id,
			QueryState {
				expr: normalized,
				remaining,
			},
		);
		(query_id, total, scheduled)
	}

	/// Scheduling step (§4.8 `(query_id, n)`): evaluates up to `n` partitions
	/// from the front of `remaining_partitions`. `n == 0` cancels the query
	/// (erases its state; no further evaluation begins, even if partitions
	/// remained). Missing `query_id` is a no-op (already finished or
	/// cancelled), matching "log and return" (§4.8 step 1).
	pub async fn schedule(&self, query_id: Uuid, n: usize) -> Vec<(Uuid, Bitmap)> {
		if n == 0 {
			self.pending.lock().await.remove(&query_id);
			return Vec::new();
		}
		let (expr, batch) = {
			let mut pending = self.pending.lock().await;
			let Some(state) = pending.get_mut(&query_id) else {
				return Vec::new();
			};
			let take = n.min(state.remaining.len());
			let batch: Vec<Uuid> = state.remaining.drain(..take).collect();
			let expr = state.expr.clone();
			if state.remaining.is_empty() {
				pending.remove(&query_id);
			}
			(expr, batch)
		};
		let mut results = Vec::with_capacity(batch.len());
		for id in batch {
			let _permit = self.workers.clone().acquire_owned().await.expect("semaphore not closed");
			let bitmap = match tokio::time::timeout(self.eval_timeout, self.lookup.evaluate(id, &expr)).await {
				Ok(bitmap) => bitmap,
				Err(_) => {
					warn!(partition = %id, timeout_ms = self.eval_timeout.as_millis(), "partition evaluation timed out, reporting no matches");
					Bitmap::with_size(0)
				}
			};
			results.push((id, bitmap));
		}
		results
	}

	/// Partitions still queued for `query_id`; zero once finished or cancelled.
	pub async fn remaining_count(&self, query_id: Uuid) -> usize {
		self.pending.lock().await.get(&query_id).map(|s| s.remaining.len()).unwrap_or(0)
	}
}
