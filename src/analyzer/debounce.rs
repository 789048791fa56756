use std::collections::HashMap;
use std::sync::Mutex;

use tower_lsp::lsp_types::Url;

/// Holds at most one unexecuted unit of work. Scheduling replaces whatever
/// was pending and bumps the generation, so a timer started for older work
/// finds nothing to take.
#[derive(Debug)]
pub struct PendingSlot<T> {
    generation: u64,
    work: Option<T>,
}

impl<T> Default for PendingSlot<T> {
    fn default() -> Self {
        Self {
            generation: 0,
            work: None,
        }
    }
}

impl<T> PendingSlot<T> {
    pub fn schedule(&mut self, work: T) -> u64 {
        self.generation += 1;
        self.work = Some(work);
        self.generation
    }

    /// The pending work, only if `generation` is still current.
    pub fn take(&mut self, generation: u64) -> Option<T> {
        if generation == self.generation {
            self.work.take()
        } else {
            None
        }
    }

    /// Drops pending work; outstanding timers find nothing.
    pub fn clear(&mut self) {
        self.generation += 1;
        self.work = None;
    }

    pub fn is_pending(&self) -> bool {
        self.work.is_some()
    }
}

/// One [`PendingSlot`] per document.
#[derive(Debug)]
pub struct Debouncer<T> {
    slots: Mutex<HashMap<Url, PendingSlot<T>>>,
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> Debouncer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, uri: &Url, work: T) -> u64 {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(uri.clone()).or_default().schedule(work)
    }

    pub fn take(&self, uri: &Url, generation: u64) -> Option<T> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get_mut(uri)?.take(generation)
    }

    pub fn clear(&self, uri: &Url) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get_mut(uri) {
            slot.clear();
        }
    }

    pub fn is_pending(&self, uri: &Url) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(uri).is_some_and(PendingSlot::is_pending)
    }
}
