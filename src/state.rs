//! Named state providers ("staters") and their JSON endpoints.
//!
//! A stater is a host-supplied function producing a serializable snapshot of
//! application state; `true` asks for the previous snapshot where the host
//! tracks one. The registry keeps a bounded history of full snapshots and can
//! mount `current.json` / `previous.json` / `history.json` onto a route table.

use crate::http::Connection;
use crate::route::{handler, PathHandler, RouteError};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

pub type Stater = Box<dyn Fn(bool) -> Value + Send + Sync>;

// 30 minutes of snapshots at a 60 Hz update cadence.
const HISTORY_LIMIT: usize = 60 * 60 * 30;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("a stater named `{name}` is already registered")]
    Duplicate { name: String },
}

#[derive(Default)]
pub struct StateRegistry {
    staters: Mutex<FxHashMap<String, Stater>>,
    history: Mutex<VecDeque<Map<String, Value>>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stater(
        &self,
        name: &str,
        stater: impl Fn(bool) -> Value + Send + Sync + 'static,
    ) -> Result<(), StateError> {
        let mut staters = self.staters.lock();
        if staters.contains_key(name) {
            return Err(StateError::Duplicate {
                name: name.to_string(),
            });
        }
        staters.insert(name.to_string(), Box::new(stater));
        Ok(())
    }

    fn snapshot(&self, previous: bool) -> Map<String, Value> {
        let staters = self.staters.lock();
        let mut states = Map::new();
        for (name, stater) in staters.iter() {
            states.insert(name.clone(), stater(previous));
        }
        states
    }

    /// Appends the current snapshot to the history, resetting the queue when
    /// it hits the limit.
    pub fn update(&self) {
        let states = self.snapshot(false);
        let mut history = self.history.lock();
        if history.len() >= HISTORY_LIMIT {
            history.clear();
        }
        history.push_back(states);
    }

    /// The current states, keyed by stater name.
    pub fn current(&self) -> Value {
        Value::Object(self.snapshot(false))
    }

    /// The previous states, keyed by stater name.
    pub fn previous(&self) -> Value {
        Value::Object(self.snapshot(true))
    }

    /// Drains the recorded history into a JSON array, oldest first.
    pub fn drain_history(&self) -> Value {
        let mut history = self.history.lock();
        Value::Array(history.drain(..).map(Value::Object).collect())
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn clear(&self) {
        self.staters.lock().clear();
        self.history.lock().clear();
    }

    /// Registers the JSON state endpoints onto a route table.
    pub fn mount(self: &Arc<Self>, table: &mut PathHandler) -> Result<(), RouteError> {
        let registry = Arc::clone(self);
        table.route(
            "current.json",
            handler(move |conn: Connection, _| {
                let registry = Arc::clone(&registry);
                async move {
                    conn.serve_text(&to_json(&registry.current()), ".json").await;
                }
            }),
        )?;

        let registry = Arc::clone(self);
        table.route(
            "previous.json",
            handler(move |conn: Connection, _| {
                let registry = Arc::clone(&registry);
                async move {
                    conn.serve_text(&to_json(&registry.previous()), ".json").await;
                }
            }),
        )?;

        let registry = Arc::clone(self);
        table.route(
            "history.json",
            handler(move |conn: Connection, _| {
                let registry = Arc::clone(&registry);
                async move {
                    conn.serve_text(&to_json(&registry.drain_history()), ".json").await;
                }
            }),
        )?;

        Ok(())
    }
}

fn to_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn staters_feed_current_and_previous() {
        let registry = StateRegistry::new();
        registry
            .add_stater("score", |previous| if previous { json!(1) } else { json!(2) })
            .unwrap();
        assert_eq!(registry.current(), json!({ "score": 2 }));
        assert_eq!(registry.previous(), json!({ "score": 1 }));
    }

    #[test]
    fn duplicate_staters_are_rejected() {
        let registry = StateRegistry::new();
        registry.add_stater("score", |_| json!(0)).unwrap();
        assert!(registry.add_stater("score", |_| json!(0)).is_err());
    }

    #[test]
    fn history_drains_oldest_first() {
        let registry = StateRegistry::new();
        registry.add_stater("tick", |_| json!("t")).unwrap();
        registry.update();
        registry.update();
        assert_eq!(registry.history_len(), 2);
        let drained = registry.drain_history();
        assert_eq!(drained, json!([{ "tick": "t" }, { "tick": "t" }]));
        assert_eq!(registry.history_len(), 0);
    }
}
