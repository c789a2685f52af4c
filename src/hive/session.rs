//! Session storage seam.
//!
//! The hive brackets every access to its `SESSION` namespace with
//! [`SessionStore::start`] and writes it back with [`SessionStore::commit`].
//! Persistent backends live outside this crate; [`MemorySession`] keeps the
//! data in process, which is what CLI emulation and tests need.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;
use uuid::Uuid;

use super::value::Value;

/// A session backend.
pub trait SessionStore: Send {
    /// Opens the session `id` names (the value of the incoming session
    /// cookie), or a fresh one when `id` is `None` or unknown. Returns the
    /// id in use and the session contents.
    fn start(&mut self, id: Option<&str>) -> (String, Value);

    /// Persists `data` as the contents of session `id`.
    fn commit(&mut self, id: &str, data: &Value);

    /// Ends session `id` and discards its contents.
    fn destroy(&mut self, id: &str);

    /// Name of the session cookie.
    fn name(&self) -> &str {
        "SESSID"
    }

    /// Applies new cookie-jar parameters (`JAR`).
    fn configure(&mut self, _jar: &Value) {}
}

/// In-process session store keyed by session id. Clones share the same
/// sessions.
#[derive(Clone, Default)]
pub struct MemorySession {
    sessions: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed contents of session `id`.
    pub fn snapshot(&self, id: &str) -> Option<Value> {
        self.sessions.lock().get(id).cloned()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySession {
    fn start(&mut self, id: Option<&str>) -> (String, Value) {
        let mut sessions = self.sessions.lock();
        if let Some((id, data)) = id.and_then(|id| sessions.get_key_value(id)) {
            return (id.clone(), data.clone());
        }
        let id = Uuid::new_v4().simple().to_string();
        trace!(session = %id, "session opened");
        sessions.insert(id.clone(), Value::map());
        (id, Value::map())
    }

    fn commit(&mut self, id: &str, data: &Value) {
        self.sessions.lock().insert(id.to_owned(), data.clone());
    }

    fn destroy(&mut self, id: &str) {
        self.sessions.lock().remove(id);
    }
}
