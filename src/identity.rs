//! Resolves caller ids to actors
use super::policy::Actor;
use std::collections::HashMap;

pub trait Directory: Send + Sync {
    /// `None` means the id is unknown, i.e. the caller is not authenticated.
    fn resolve(&self, actor_id: &str) -> Option<Actor>;
}

/// Fixed set of actors, for tests and single-process tools.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    actors: HashMap<String, Actor>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, actor: Actor) -> Self {
        self.register(actor);
        self
    }

    pub fn register(&mut self, actor: Actor) {
        self.actors.insert(actor.id.clone(), actor);
    }
}

impl Directory for InMemoryDirectory {
    fn resolve(&self, actor_id: &str) -> Option<Actor> {
        self.actors.get(actor_id).cloned()
    }
}
