/// Subscribers container with ID-based removal.
///
/// Ids are handed out in subscription order and never reused, so a removal
/// coming from a stale teardown cannot hit a newer observer.
pub(crate) struct Subscribers<Ob> {
  next_id: usize,
  entries: Vec<(usize, Ob)>,
}

impl<Ob> Default for Subscribers<Ob> {
  fn default() -> Self { Self { next_id: 0, entries: vec![] } }
}

impl<Ob> Subscribers<Ob> {
  /// Add an observer and return its unique ID.
  pub fn add(&mut self, observer: Ob) -> usize {
    let id = self.next_id;
    self.next_id += 1;
    self.entries.push((id, observer));
    id
  }

  pub fn remove(&mut self, id: usize) -> Option<Ob> {
    let pos = self.entries.iter().position(|(entry, _)| *entry == id)?;
    Some(self.entries.remove(pos).1)
  }

  pub fn get_mut(&mut self, id: usize) -> Option<&mut Ob> {
    self.entries.iter_mut().find(|(entry, _)| *entry == id).map(|(_, ob)| ob)
  }

  #[inline]
  pub fn len(&self) -> usize { self.entries.len() }

  #[inline]
  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  pub fn ids(&self) -> Vec<usize> { self.entries.iter().map(|(id, _)| *id).collect() }

  pub fn iter(&self) -> impl Iterator<Item = &Ob> { self.entries.iter().map(|(_, ob)| ob) }

  /// Copy out the observers so they can be called after the lock is
  /// released.
  pub fn snapshot(&self) -> Vec<(usize, Ob)>
  where
    Ob: Clone,
  {
    self.entries.clone()
  }

  /// Remove every observer, leaving the id counter untouched.
  pub fn drain(&mut self) -> Vec<Ob> { self.entries.drain(..).map(|(_, ob)| ob).collect() }
}
