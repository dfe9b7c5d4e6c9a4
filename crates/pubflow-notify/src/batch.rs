//! Ordered, de-duplicated effect batches.
//!
//! A single operation can ask for the same effect more than once (a
//! metadata edit and a state change in one request both want a reindex).
//! Collaborators only need to hear about it once per batch.

use std::collections::HashSet;

use pubflow_state::Effect;

/// Effects to deliver for one committed operation, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectBatch {
    effects: Vec<Effect>,
    seen: HashSet<Effect>,
}

impl EffectBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an effect. Returns false if it was already queued.
    pub fn push(&mut self, effect: Effect) -> bool {
        if self.seen.insert(effect) {
            self.effects.push(effect);
            true
        } else {
            false
        }
    }

    pub fn extend<I: IntoIterator<Item = Effect>>(&mut self, effects: I) {
        for effect in effects {
            self.push(effect);
        }
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.effects.iter()
    }

    pub fn into_effects(self) -> Vec<Effect> {
        self.effects
    }
}

impl FromIterator<Effect> for EffectBatch {
    fn from_iter<I: IntoIterator<Item = Effect>>(iter: I) -> Self {
        let mut batch = Self::new();
        batch.extend(iter);
        batch
    }
}
