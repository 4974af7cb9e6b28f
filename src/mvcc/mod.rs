//! # Multi-Version Concurrency Control Primitives
//!
//! Every tuple stored in a heap page carries a header naming the
//! transaction that created it (`xmin`) and, once superseded or deleted,
//! the transaction that did so (`xmax`). Updates within a page link the
//! superseded version to its successor, forming the chains the pruning
//! layer maintains.
//!
//! Whether a given version is still needed depends on the visibility
//! horizon: the oldest transaction that could still see old rows. That
//! classification belongs to the transaction machinery, not this crate,
//! so it enters through the [`Visibility`] trait; [`HorizonVisibility`]
//! is the straightforward horizon-plus-in-progress-set implementation
//! used by tests and single-node callers.
//!
//! Transaction ids are plain `u64`s. Id 0 is reserved as invalid: an
//! `xmax` of 0 means the tuple was never superseded, and an `xmin` of 0
//! marks a version whose creating transaction aborted.

mod tuple;
mod visibility;

pub use tuple::{flags, TupleHeader, TUPLE_HEADER_SIZE};
pub use visibility::{HorizonVisibility, TupleStatus, Visibility};

/// Transaction identifier.
pub type TxId = u64;

/// Reserved id meaning "no transaction".
pub const INVALID_TX_ID: TxId = 0;
