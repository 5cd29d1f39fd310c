//! Component state tracking with per-state and per-component callbacks.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{error, info};

use fabric_primitives::ComponentId;

use crate::error::{LifecycleError, LifecycleResult};
use crate::state::{ComponentState, StateTransition};

/// Callback fired when any component enters a specific state.
pub type StateCallback = Arc<dyn Fn(&ComponentId, &Map<String, Value>) + Send + Sync>;

/// Callback fired when a specific component changes state.
pub type ComponentCallback = Arc<dyn Fn(ComponentState, &Map<String, Value>) + Send + Sync>;

/// Callback fired on every recorded transition.
pub type TransitionCallback = Arc<dyn Fn(&ComponentId, &StateTransition) + Send + Sync>;

#[derive(Debug, Clone)]
struct ComponentRecord {
    state: ComponentState,
    metadata: Map<String, Value>,
    history: Vec<StateTransition>,
}

#[derive(Default)]
struct Callbacks {
    per_state: HashMap<ComponentState, Vec<StateCallback>>,
    per_component: HashMap<ComponentId, Vec<ComponentCallback>>,
    transitions: Vec<TransitionCallback>,
}

/// Tracks component states and invokes observers on every transition.
///
/// Only the lifecycle supervisor (and its deadlock monitor) write through
/// this type. Observer panics are isolated.
pub struct StateObserver {
    components: RwLock<HashMap<ComponentId, ComponentRecord>>,
    callbacks: std::sync::RwLock<Callbacks>,
}

impl StateObserver {
    /// Creates an observer with no tracked components.
    #[must_use]
    pub fn new() -> Self {
        Self {
            components: RwLock::new(HashMap::new()),
            callbacks: std::sync::RwLock::new(Callbacks::default()),
        }
    }

    /// Registers a component for observation in the given initial state.
    pub async fn track(
        &self,
        id: ComponentId,
        initial_state: ComponentState,
        metadata: Map<String, Value>,
    ) {
        let mut guard = self.components.write().await;
        guard.entry(id.clone()).or_insert_with(|| {
            info!(component = %id, state = %initial_state, "component tracked");
            ComponentRecord {
                state: initial_state,
                metadata,
                history: Vec::new(),
            }
        });
    }

    /// Applies a state transition, merging metadata into the record.
    ///
    /// Untracked components are registered on the fly at
    /// [`ComponentState::Unknown`] before the transition is applied.
    /// Re-entering the current state refreshes metadata without recording
    /// a transition and returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] when the move is not
    /// permitted by the state table.
    pub async fn set_state(
        &self,
        id: &ComponentId,
        state: ComponentState,
        metadata: Map<String, Value>,
    ) -> LifecycleResult<bool> {
        let transition = {
            let mut guard = self.components.write().await;
            let record = guard.entry(id.clone()).or_insert_with(|| ComponentRecord {
                state: ComponentState::Unknown,
                metadata: Map::new(),
                history: Vec::new(),
            });

            if record.state == state {
                record.metadata.extend(metadata);
                return Ok(false);
            }
            if !record.state.can_transition(state) {
                return Err(LifecycleError::InvalidTransition {
                    component: id.clone(),
                    from: record.state,
                    to: state,
                });
            }

            let transition = StateTransition {
                from: record.state,
                to: state,
                at: Utc::now(),
                metadata: metadata.clone(),
            };
            record.state = state;
            record.metadata.extend(metadata);
            record.history.push(transition.clone());
            info!(component = %id, from = %transition.from, to = %transition.to, "state transition");
            transition
        };

        self.fire(id, &transition);
        Ok(true)
    }

    /// Returns a component's state and metadata snapshot.
    ///
    /// Untracked components report [`ComponentState::Unknown`].
    pub async fn state_of(&self, id: &ComponentId) -> (ComponentState, Map<String, Value>) {
        self.components.read().await.get(id).map_or_else(
            || (ComponentState::Unknown, Map::new()),
            |record| (record.state, record.metadata.clone()),
        )
    }

    /// Returns the recorded transition history for a component.
    pub async fn history(&self, id: &ComponentId) -> Vec<StateTransition> {
        self.components
            .read()
            .await
            .get(id)
            .map(|record| record.history.clone())
            .unwrap_or_default()
    }

    /// Returns every tracked component with state and metadata.
    pub async fn all(&self) -> HashMap<ComponentId, (ComponentState, Map<String, Value>)> {
        self.components
            .read()
            .await
            .iter()
            .map(|(id, record)| (id.clone(), (record.state, record.metadata.clone())))
            .collect()
    }

    /// Registers a callback for when any component enters `state`.
    pub fn on_state(&self, state: ComponentState, callback: StateCallback) {
        self.callbacks
            .write()
            .expect("callback lock poisoned")
            .per_state
            .entry(state)
            .or_default()
            .push(callback);
    }

    /// Registers a callback for when a specific component changes state.
    pub fn on_component(&self, id: ComponentId, callback: ComponentCallback) {
        self.callbacks
            .write()
            .expect("callback lock poisoned")
            .per_component
            .entry(id)
            .or_default()
            .push(callback);
    }

    /// Registers a callback invoked on every recorded transition.
    pub fn on_transition(&self, callback: TransitionCallback) {
        self.callbacks
            .write()
            .expect("callback lock poisoned")
            .transitions
            .push(callback);
    }

    fn fire(&self, id: &ComponentId, transition: &StateTransition) {
        let (state_cbs, component_cbs, transition_cbs) = {
            let guard = self.callbacks.read().expect("callback lock poisoned");
            (
                guard.per_state.get(&transition.to).cloned().unwrap_or_default(),
                guard.per_component.get(id).cloned().unwrap_or_default(),
                guard.transitions.clone(),
            )
        };

        for callback in state_cbs {
            if catch_unwind(AssertUnwindSafe(|| callback(id, &transition.metadata))).is_err() {
                error!(component = %id, state = %transition.to, "state callback panicked");
            }
        }
        for callback in component_cbs {
            if catch_unwind(AssertUnwindSafe(|| callback(transition.to, &transition.metadata)))
                .is_err()
            {
                error!(component = %id, "component callback panicked");
            }
        }
        for callback in transition_cbs {
            if catch_unwind(AssertUnwindSafe(|| callback(id, transition))).is_err() {
                error!(component = %id, "transition callback panicked");
            }
        }
    }
}

impl Default for StateObserver {
    fn default() -> Self {
        Self::new()
    }
}
