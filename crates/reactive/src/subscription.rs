//! Subscribers of one live query.
//!
//! Callbacks run in subscription order. Ids are never reused, so an id kept
//! after unsubscribing cannot silence a later subscriber.

use crate::state::Notification;
use alloc::boxed::Box;
use alloc::vec::Vec;

/// Identifies a subscriber within its live query.
pub type SubscriptionId = u64;

type Callback = Box<dyn Fn(&Notification)>;

/// The callbacks waiting on one live query's notifications.
pub struct Subscribers {
    callbacks: Vec<(SubscriptionId, Callback)>,
    next_id: SubscriptionId,
}

impl Default for Subscribers {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscribers {
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
            next_id: 1,
        }
    }

    /// Adds a callback and returns the id that removes it again.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&Notification) + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Returns false if the id is not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(sub, _)| *sub != id);
        self.callbacks.len() != before
    }

    pub fn notify(&self, notification: &Notification) {
        for (_, callback) in &self.callbacks {
            callback(notification);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl core::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list()
            .entries(self.callbacks.iter().map(|(id, _)| id))
            .finish()
    }
}
