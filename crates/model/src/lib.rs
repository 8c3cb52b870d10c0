//! Leaf data types for the offline DataStore sync engine: model schemas, the
//! type-erased model instance, mutation sync metadata and its envelope,
//! locally-queued mutation events, and sync-filter predicates.
//!
//! Everything in this crate is plain data. No I/O, no async.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod metadata;
mod model;
mod mutation;
mod predicate;
mod schema;

pub use metadata::{MutationSync, MutationSyncMetadata};
pub use model::AnyModel;
pub use mutation::{MutationEvent, MutationType};
pub use predicate::{ComparisonOperator, SyncExpression, SyncPredicate};
pub use schema::{AuthRule, FieldKind, ModelField, ModelSchema};
