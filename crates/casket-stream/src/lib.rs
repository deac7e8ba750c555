//! Parallel conversion between byte streams and block sets.
//!
//! The [`StreamSharder`] cuts an input stream into fixed-size shards and
//! persists them as Data blocks through N workers, producing the
//! [`casket_block::IndexBlock`] that describes the stream. The
//! [`Assembler`] runs the pipeline in reverse, fetching children in
//! parallel and sequencing the output back into exact stream order.
//!
//! Both pipelines abort on the first worker error and honor a shared
//! [`CancelToken`].

pub mod assembler;
pub mod cancel;
pub mod error;
pub mod sharder;

pub use assembler::Assembler;
pub use cancel::CancelToken;
pub use error::{StreamError, StreamResult};
pub use sharder::StreamSharder;
