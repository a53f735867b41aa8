use super::{subscribers::Subscribers, Terminal};
use crate::{
  ack::{continue_ack, stop_ack, Ack, Outcome},
  observable::Observable,
  observer::{BoxedObserver, Observer},
  rc::MutArc,
  scheduler::SharedScheduler,
  subscription::{SharedSubscription, Teardown},
};

type SharedObserver<Item, Err> = MutArc<BoxedObserver<Item, Err>>;

struct PublishState<Item, Err> {
  observers: Subscribers<SharedObserver<Item, Err>>,
  terminal: Option<Terminal<Err>>,
}

/// Hot multicast without buffering.
///
/// Every pushed value goes to the observers subscribed at that moment; late
/// subscribers only see later values, or the terminal event if the subject
/// already terminated. The acknowledgment returned to the producer resolves
/// once every observer acknowledged the value. Observers answering `Stop`
/// are removed, the subject itself keeps accepting values.
pub struct PublishSubject<Item, Err>(MutArc<PublishState<Item, Err>>);

impl<Item, Err> Clone for PublishSubject<Item, Err> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<Item, Err> Default for PublishSubject<Item, Err> {
  fn default() -> Self {
    Self(MutArc::own(PublishState { observers: Subscribers::default(), terminal: None }))
  }
}

impl<Item, Err> PublishSubject<Item, Err> {
  pub fn new() -> Self { Self::default() }

  pub fn observer_count(&self) -> usize { self.0.rc_deref_mut().observers.len() }

  pub fn is_terminated(&self) -> bool { self.0.rc_deref_mut().terminal.is_some() }

  fn settle(&self, id: usize, outcome: Outcome) {
    if outcome.is_stop() {
      let _removed = self.0.rc_deref_mut().observers.remove(id);
      tracing::debug!(id, "publish subject observer stopped");
    }
  }

  fn terminate(&self, terminal: Terminal<Err>) -> Vec<SharedObserver<Item, Err>> {
    let mut state = self.0.rc_deref_mut();
    if state.terminal.is_some() {
      return vec![];
    }
    state.terminal = Some(terminal);
    state.observers.drain()
  }
}

impl<Item, Err> Observer<Item, Err> for PublishSubject<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  fn on_next(&mut self, value: Item) -> Ack {
    let observers = {
      let state = self.0.rc_deref_mut();
      if state.terminal.is_some() {
        return stop_ack();
      }
      state.observers.snapshot()
    };

    let mut settled = continue_ack();
    for (id, observer) in observers {
      let ack = observer.rc_deref_mut().on_next(value.clone());
      match ack.value() {
        Some(outcome) => self.settle(id, outcome),
        None => {
          let done = Ack::new();
          let c_done = done.clone();
          let subject = self.clone();
          ack.on_resolved(move |outcome| {
            subject.settle(id, outcome);
            c_done.resolve(Outcome::Continue);
          });
          settled = settled.merge(&done);
        }
      }
    }
    settled
  }

  fn on_error(&mut self, err: Err) {
    for observer in self.terminate(Terminal::Error(err.clone())) {
      observer.rc_deref_mut().on_error(err.clone());
    }
  }

  fn on_completed(&mut self) {
    for observer in self.terminate(Terminal::Completed) {
      observer.rc_deref_mut().on_completed();
    }
  }
}

impl<Item, Err> Observable<Item, Err> for PublishSubject<Item, Err>
where
  Item: Send + 'static,
  Err: Clone + Send + 'static,
{
  fn actual_subscribe(
    &self, mut observer: BoxedObserver<Item, Err>, _scheduler: &SharedScheduler,
    _subscribe_scheduler: &SharedScheduler,
  ) -> SharedSubscription {
    let mut state = self.0.rc_deref_mut();
    if let Some(terminal) = state.terminal.clone() {
      drop(state);
      match terminal {
        Terminal::Completed => observer.on_completed(),
        Terminal::Error(err) => observer.on_error(err),
      }
      return SharedSubscription::default();
    }
    let id = state.observers.add(MutArc::own(observer));
    drop(state);

    let subject = self.0.clone();
    let subscription = SharedSubscription::default();
    subscription.add(Teardown::new(move || {
      let _removed = subject.rc_deref_mut().observers.remove(id);
    }));
    subscription
  }
}
