//! Prelude module for convenient imports

// Acknowledgments
pub use crate::ack::{continue_ack, stop_ack, Ack, AckFuture, Outcome};
pub use crate::buffer::DequeuableBuffer;
pub use crate::error::{BufferError, ProtocolViolation};
// Core traits
pub use crate::observable::{
  from_iter, BoxedObservable, ConnectableObservable, FromIter, Observable, ObservableExt,
};
pub use crate::observer::{BoxedObserver, FnMutObserver, Observer};
// Operators
pub use crate::ops::{
  flat_map::FlatMapOp,
  flat_zip::FlatZipOp,
  observe_on::ObserveOnOp,
  ref_count::RefCount,
  window::{WindowLeft, WindowRight},
  zip::ZipOp,
  Alignment, JoinPolicy, KeyOrder, MatchAll,
};
#[cfg(feature = "futures-scheduler")]
pub use crate::scheduler::thread_pool;
pub use crate::scheduler::{
  Duration, ImmediateScheduler, Scheduler, SharedScheduler, Task, TestScheduler,
};
pub use crate::subject::{ControlledSubject, PublishSubject, Subject};
pub use crate::subscription::{SharedSubscription, SubscriptionGuard, SubscriptionLike, Teardown};
pub use crate::testing::{AckMode, TestObservable, TestObserver};
