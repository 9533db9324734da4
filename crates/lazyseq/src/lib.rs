//! Deferred sequence chains.
//!
//! Wrap an array, object, text, generator rule or external source with
//! [`wrap`] (or one of [`generate`], [`range`], [`repeat`]), chain operators
//! on the returned [`Sequence`], and nothing runs until a terminal operation
//! (`each`, `to_vec`, `first`, `reduce`, ...) pulls elements through the
//! chain. Terminals stop as soon as their answer is known, so chains over
//! unbounded generators are fine as long as something limits them.
//!
//! ```
//! use lazyseq::{Value, generate};
//!
//! let firsts = generate(|i| i, None)
//!     .filter(|v| v.as_number().is_some_and(|n| n % 2.0 == 0.0))
//!     .map(|v| v.as_number().unwrap_or(0.0) * 10.0)
//!     .take(3)
//!     .to_vec()
//!     .unwrap();
//! assert_eq!(firsts, vec![Value::from(0), Value::from(20), Value::from(40)]);
//! ```

pub mod asynchronous;
pub mod config;
pub mod error;
mod memo;
pub mod registry;
pub mod sequence;
pub mod value;
pub mod value_set;

pub use asynchronous::{AsyncHandle, AsyncOutcome, CancelToken};
pub use config::{Tuning, TuningBuilder};
pub use error::{Error, ErrorKind, Result};
pub use registry::{Behavior, Registry};
pub use sequence::{
    Capability, Cursor, Delimiter, Entry, Flow, Iter, Pattern, Sequence, SequenceCursor, Source, Upstream, VecSource,
    Visit, generate, range, range_by, repeat, wrap,
};
pub use value::{Key, ObjectMap, Value};
pub use value_set::ValueSet;
