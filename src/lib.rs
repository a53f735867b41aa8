//! # rxbackpressure: reactive streams with acknowledgment-based backpressure
//!
//! Every `on_next` returns an [`Ack`]. A producer must wait until that
//! acknowledgment resolves to [`Outcome::Continue`] before emitting again;
//! [`Outcome::Stop`] cancels the stream. Operators combine the
//! acknowledgments of their inputs, so a slow consumer throttles every
//! producer upstream of it.
//!
//! ## Quick Start
//!
//! ```rust
//! use rxbackpressure::prelude::*;
//!
//! let observer = TestObserver::<(i32, char), ()>::auto();
//! from_iter(vec![1, 2, 3])
//!   .zip(from_iter(vec!['a', 'b']))
//!   .subscribe(observer.clone(), ImmediateScheduler, ImmediateScheduler);
//!
//! assert_eq!(observer.received(), vec![(1, 'a'), (2, 'b')]);
//! assert!(observer.is_completed());
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Ack`] | Single-assignment backpressure signal |
//! | [`Observable`] | A source honouring the acknowledgment protocol |
//! | [`Observer`] | Consumes values and acknowledges each of them |
//! | [`Scheduler`] | Runs deferred emissions |
//! | [`ControlledSubject`] | Buffers for observers running at different paces |
//!
//! ## Feature Flags
//!
//! - **`futures-scheduler`** (default): a [`Scheduler`] for the `futures`
//!   thread pool
//! - **`tokio-scheduler`**: a [`Scheduler`] for tokio runtime handles
//!
//! [`Ack`]: ack::Ack
//! [`Outcome::Continue`]: ack::Outcome::Continue
//! [`Outcome::Stop`]: ack::Outcome::Stop
//! [`Observable`]: observable::Observable
//! [`Observer`]: observer::Observer
//! [`Scheduler`]: scheduler::Scheduler
//! [`ControlledSubject`]: subject::ControlledSubject

pub mod ack;
pub mod buffer;
pub mod error;
pub mod observable;
pub mod observer;
pub mod ops;
pub mod prelude;
pub mod rc;
pub mod scheduler;
pub mod subject;
pub mod subscription;
pub mod testing;

pub use prelude::*;
