//! A normalized, reactive, in-memory cache for GraphQL query results.
//!
//! [`Cache`] is the single entry point: normalize query results into a flat, denormalized store
//! ([`write`](Cache::write)), read denormalized trees back out ([`read`](Cache::read)/
//! [`diff`](Cache::diff)), subscribe to changes ([`watch`](Cache::watch)), and layer optimistic
//! mutations on top without touching committed data
//! ([`record_optimistic_transaction`](Cache::record_optimistic_transaction)).
//!
//! The crate never parses GraphQL text itself — callers parse their own documents with
//! [`graphql_parser::parse_query`] and hand the resulting `Document` to `Cache`'s methods.
//!
//! The cache is single-threaded and synchronous by design (`!Send + !Sync`); callers needing
//! concurrent access must add their own external synchronization.

mod ast;
mod cache;
mod config;
mod dependency;
mod error;
mod event;
mod extract;
mod fragment;
mod fragment_matcher;
mod id;
mod id_fn;
mod key_index;
mod layer;
mod memo;
mod record;
mod reader;
mod store;
mod value;
mod writer;
mod watch;

pub use ast::{Document, FragmentDefinition};
pub use cache::{Cache, OptimisticWrite, WatchHandle};
pub use config::{CacheConfig, CacheRedirectResolver, CacheRedirects, IdOf};
pub use error::{Error, ErrorKind, Result};
pub use event::{Event, EventKind, EventListener};
pub use fragment_matcher::{FragmentMatcher, Heuristic, MatchResult, PossibleTypes};
pub use id::{root_mutation_key, root_query_key, root_subscription_key, StoreKey, ROOT_MUTATION, ROOT_QUERY, ROOT_SUBSCRIPTION};
pub use reader::{DiffResult, MissingFieldReport, ResultObject, ResultValue};
pub use record::{StoreFieldKey, StoreRecord};
pub use value::{Reference, StoreValue};
pub use watch::WatchId;
