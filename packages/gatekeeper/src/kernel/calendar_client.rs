//! The calendar provider interface (spec §4.10). The concrete upstream
//! SDK is out of scope (spec §1); the core only depends on this trait.

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, thiserror::Error)]
#[error("calendar provider error (status {status_code:?}): {message}")]
pub struct CalendarError {
    /// HTTP-status-like code feeding directly into the §4.9 retryable
    /// predicate; `None` for errors with no status (e.g. local timeout).
    pub status_code: Option<u16>,
    pub message: String,
    pub timeout: bool,
}

impl CalendarError {
    pub fn new(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
            timeout: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
            timeout: true,
        }
    }
}

pub type CalendarResult<T> = Result<T, CalendarError>;

#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn create_event(&self, calendar_id: &str, event: &Value) -> CalendarResult<Value>;
    async fn update_event(&self, calendar_id: &str, event_id: &str, patch: &Value) -> CalendarResult<Value>;
    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> CalendarResult<()>;
    async fn get_event(&self, calendar_id: &str, event_id: &str) -> CalendarResult<Value>;
    async fn list_events(&self, calendar_id: &str, time_min: Option<&str>, time_max: Option<&str>) -> CalendarResult<Vec<Value>>;
    async fn free_busy(&self, calendar_ids: &[String], time_min: &str, time_max: &str) -> CalendarResult<Value>;
    async fn list_calendars(&self) -> CalendarResult<Vec<Value>>;
}

/// In-memory stand-in used by tests to drive the execution queue and its
/// retry path without a real provider. Recognizes a magic `force_status`
/// field on the submitted event to script 429/503/200 sequences (spec
/// §4.10). Not used in production — the real client lives outside this
/// workspace's scope.
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub struct NullCalendar {
        events: Mutex<HashMap<String, Value>>,
        /// Per-call-count scripted responses, keyed by a caller-chosen
        /// script id so a single instance can drive several requests'
        /// retry sequences independently.
        scripts: Mutex<HashMap<String, Vec<u16>>>,
    }

    impl NullCalendar {
        pub fn new() -> Self {
            Self {
                events: Mutex::new(HashMap::new()),
                scripts: Mutex::new(HashMap::new()),
            }
        }

        /// Script a sequence of HTTP-status-like outcomes for a given id;
        /// each call to `create_event` (or `update_event`) with a payload
        /// carrying `{"force_status_script": "<id>"}` consumes the next
        /// entry, looping at `200` once the script is exhausted.
        pub fn script(&self, script_id: impl Into<String>, statuses: Vec<u16>) {
            self.scripts.lock().unwrap().insert(script_id.into(), statuses);
        }

        fn next_status(&self, event: &Value) -> u16 {
            let Some(script_id) = event.get("force_status_script").and_then(Value::as_str) else {
                return 200;
            };
            let mut scripts = self.scripts.lock().unwrap();
            let Some(sequence) = scripts.get_mut(script_id) else {
                return 200;
            };
            if sequence.is_empty() {
                200
            } else {
                sequence.remove(0)
            }
        }

        fn status_to_result(status: u16, value: Value) -> CalendarResult<Value> {
            if status == 200 {
                Ok(value)
            } else {
                Err(CalendarError::new(Some(status), format!("scripted failure ({status})")))
            }
        }
    }

    impl Default for NullCalendar {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl CalendarClient for NullCalendar {
        async fn create_event(&self, _calendar_id: &str, event: &Value) -> CalendarResult<Value> {
            let status = self.next_status(event);
            let id = uuid::Uuid::new_v4().to_string();
            let mut stored = event.clone();
            stored["id"] = Value::String(id.clone());
            if status == 200 {
                self.events.lock().unwrap().insert(id, stored.clone());
            }
            Self::status_to_result(status, stored)
        }

        async fn update_event(&self, _calendar_id: &str, event_id: &str, patch: &Value) -> CalendarResult<Value> {
            let status = self.next_status(patch);
            let mut events = self.events.lock().unwrap();
            let existing = events
                .get(event_id)
                .cloned()
                .ok_or_else(|| CalendarError::new(Some(404), "event not found"))?;
            if status == 200 {
                let mut merged = existing;
                if let (Value::Object(base), Value::Object(patch_obj)) = (&mut merged, patch) {
                    for (k, v) in patch_obj {
                        base.insert(k.clone(), v.clone());
                    }
                }
                events.insert(event_id.to_string(), merged.clone());
                Ok(merged)
            } else {
                Err(CalendarError::new(Some(status), format!("scripted failure ({status})")))
            }
        }

        async fn delete_event(&self, _calendar_id: &str, event_id: &str) -> CalendarResult<()> {
            self.events.lock().unwrap().remove(event_id);
            Ok(())
        }

        async fn get_event(&self, _calendar_id: &str, event_id: &str) -> CalendarResult<Value> {
            self.events
                .lock()
                .unwrap()
                .get(event_id)
                .cloned()
                .ok_or_else(|| CalendarError::new(Some(404), "event not found"))
        }

        async fn list_events(&self, _calendar_id: &str, _time_min: Option<&str>, _time_max: Option<&str>) -> CalendarResult<Vec<Value>> {
            Ok(self.events.lock().unwrap().values().cloned().collect())
        }

        async fn free_busy(&self, _calendar_ids: &[String], _time_min: &str, _time_max: &str) -> CalendarResult<Value> {
            Ok(serde_json::json!({ "busy": [] }))
        }

        async fn list_calendars(&self) -> CalendarResult<Vec<Value>> {
            Ok(vec![serde_json::json!({ "id": "primary", "summary": "Primary Calendar" })])
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn scripted_sequence_retries_then_succeeds() {
            let calendar = NullCalendar::new();
            calendar.script("s1", vec![503, 503]);
            let event = serde_json::json!({ "summary": "test", "force_status_script": "s1" });

            let first = calendar.create_event("primary", &event).await;
            assert!(first.is_err());
            let second = calendar.create_event("primary", &event).await;
            assert!(second.is_err());
            let third = calendar.create_event("primary", &event).await;
            assert!(third.is_ok());
        }
    }
}
