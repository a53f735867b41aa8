use crate::{
  ack::Ack,
  observable::Observable,
  observer::{BoxedObserver, Observer},
  rc::MutArc,
  scheduler::SharedScheduler,
  subscription::SharedSubscription,
};

/// Re-emits every notification of `source` from a task on `scheduler`.
///
/// The acknowledgment handed to the source resolves once the downstream
/// acknowledged the value delivered by that task.
#[derive(Clone)]
pub struct ObserveOnOp<S> {
  pub(crate) source: S,
  pub(crate) scheduler: SharedScheduler,
}

impl<S, Item, Err> Observable<Item, Err> for ObserveOnOp<S>
where
  S: Observable<Item, Err>,
  Item: Send + 'static,
  Err: Send + 'static,
{
  fn actual_subscribe(
    &self, observer: BoxedObserver<Item, Err>, scheduler: &SharedScheduler,
    subscribe_scheduler: &SharedScheduler,
  ) -> SharedSubscription {
    let observer =
      ObserveOnObserver { observer: MutArc::own(observer), scheduler: self.scheduler.clone() };
    self.source.actual_subscribe(Box::new(observer), scheduler, subscribe_scheduler)
  }
}

pub struct ObserveOnObserver<Item, Err> {
  observer: MutArc<BoxedObserver<Item, Err>>,
  scheduler: SharedScheduler,
}

impl<Item, Err> Observer<Item, Err> for ObserveOnObserver<Item, Err>
where
  Item: Send + 'static,
  Err: Send + 'static,
{
  fn on_next(&mut self, value: Item) -> Ack {
    let ack = Ack::new();
    let observer = self.observer.clone();
    let forwarded = ack.clone();
    self.scheduler.schedule(Box::new(move || {
      let downstream = observer.rc_deref_mut().on_next(value);
      downstream.chain(&forwarded);
    }));
    ack
  }

  fn on_error(&mut self, err: Err) {
    let observer = self.observer.clone();
    self.scheduler.schedule(Box::new(move || observer.rc_deref_mut().on_error(err)));
  }

  fn on_completed(&mut self) {
    let observer = self.observer.clone();
    self.scheduler.schedule(Box::new(move || observer.rc_deref_mut().on_completed()));
  }
}
