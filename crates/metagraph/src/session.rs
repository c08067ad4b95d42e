//! Memoizing front door for the generators.
//!
//! A [`GraphSession`] owns the [`GraphStore`] of one compilation and caches
//! generated graphs per `(generator, normalized signature)`, so repeated call
//! sites with the same abstract types share one specialized graph.

use std::num::NonZeroUsize;

use anyhow::{anyhow, Context, Result};
use log::{debug, trace};
use lru::LruCache;

use crate::abstract_value::AbstractValue;
use crate::composite::{MetaFuncGraph, MetaGraph};
use crate::ir::{GraphId, GraphStore, NodeId, Value};
use crate::settings::{self, Settings};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    meta: MetaGraph,
    args: Vec<AbstractValue>,
}

/// Store plus a bounded signature cache.
///
/// Eviction only forgets the cache entry. The evicted graph stays in the store,
/// since call sites and other generated graphs may still reference it, so the
/// store grows with every distinct specialization for the session's lifetime.
/// Use one session per compilation and drop it (or take the store with
/// [`GraphSession::into_store`]) when done.
pub struct GraphSession {
    store: GraphStore,
    cache: LruCache<CacheKey, GraphId>,
}

impl Default for GraphSession {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphSession {
    /// Session sized by `METAGRAPH_CACHE_CAPACITY`.
    pub fn new() -> Self {
        Self::with_capacity(settings::settings().cache_capacity.get())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity =
            NonZeroUsize::new(capacity).unwrap_or_else(|| Settings::default().cache_capacity);
        Self {
            store: GraphStore::new(),
            cache: LruCache::new(capacity),
        }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut GraphStore {
        &mut self.store
    }

    pub fn into_store(self) -> GraphStore {
        self.store
    }

    /// Number of signatures currently cached.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Graph specialized for `meta` at `args`, generated on first use.
    pub fn generate(&mut self, meta: &MetaGraph, args: &[AbstractValue]) -> Result<GraphId> {
        let name = meta.name();
        let args = meta
            .normalize_args(&self.store, args)
            .with_context(|| format!("failed to normalize arguments of '{name}'"))?;
        let key = CacheKey {
            meta: meta.clone(),
            args,
        };
        if let Some(graph) = self.cache.get(&key) {
            trace!("cache hit for '{name}' -> @g{}", graph.0);
            return Ok(*graph);
        }

        let graph = meta
            .generate(&mut self.store, &key.args)
            .with_context(|| format!("failed to generate graph for '{name}'"))?;
        debug!(
            "generated @{} for '{name}' with {} argument(s)",
            self.store.graph(graph).name,
            key.args.len()
        );
        self.cache.put(key, graph);
        Ok(graph)
    }

    /// Specializes the generator called at `node` for the given argument types.
    pub fn expand_call(&mut self, node: NodeId, args: &[AbstractValue]) -> Result<GraphId> {
        let meta = match self.store.callee(node) {
            Some(Value::Meta(meta)) => meta.clone(),
            Some(other) => return Err(anyhow!("node %{} calls {other}, not a generator", node.0)),
            None => return Err(anyhow!("node %{} is not a call with a constant operator", node.0)),
        };
        let arity = self.store.call_args(node).len();
        if arity != args.len() {
            return Err(anyhow!(
                "node %{} passes {arity} argument(s) but {} abstract value(s) were given",
                node.0,
                args.len()
            ));
        }
        self.generate(&meta, args)
    }
}
