//! Declared application tables.
//!
//! These match the bundled migrations under `migrations/`.

use crate::define_table;
use crate::models::{RecordShape, Table};
use chrono::{DateTime, Utc};

define_table! {
    /// An app user with their auth-provider profile and body measurements.
    pub struct User {
        table: "users",
        primary_key: user_id,
        json: [firebase_data, body_data],
        fields: {
            user_id: String => Text, Required;
            firebase_data: serde_json::Value => Json, Required;
            body_data: serde_json::Value => Json, Required;
            created_at: Option<DateTime<Utc>> => Timestamp, Generated;
            updated_at: Option<DateTime<Utc>> => Timestamp, Generated;
        }
    }
}

define_table! {
    /// One exercise session on a device.
    pub struct Session {
        table: "sessions",
        primary_key: session_id,
        json: [exercises_data],
        fields: {
            session_id: String => Text, Required;
            ts_start: DateTime<Utc> => Timestamp, Required;
            user_id: String => Text, Required;
            exercises_data: serde_json::Value => Json, Required;
            device_type: String => Text, Required;
            device_os: String => Text, Required;
            region: String => Text, Required;
            ip: String => Text, Required;
            app_version: String => Text, Required;
        }
    }
}

define_table! {
    pub struct Recording {
        table: "recordings",
        primary_key: recording_id,
        json: [],
        fields: {
            recording_id: String => Text, Required;
            recording_link: String => Text, Required;
            recording_type: String => Text, Required;
            user_id: String => Text, Required;
            created_at: Option<DateTime<Utc>> => Timestamp, Generated;
            updated_at: Option<DateTime<Utc>> => Timestamp, Generated;
            created_session_id: String => Text, Required;
        }
    }
}

define_table! {
    pub struct Algo {
        table: "algos",
        primary_key: algo_id,
        json: [],
        fields: {
            algo_id: String => Text, Required;
            recording_type: String => Text, Required;
            location: String => Text, Required;
            version: String => Text, Required;
            created_at: Option<DateTime<Utc>> => Timestamp, Generated;
            updated_at: Option<DateTime<Utc>> => Timestamp, Generated;
        }
    }
}

define_table! {
    /// Client-side event; `event_id` comes from a sequence.
    pub struct EventLog {
        table: "event_log",
        primary_key: event_id,
        json: [event_data],
        fields: {
            event_id: Option<i64> => Integer, Generated;
            ts: DateTime<Utc> => Timestamp, Required;
            user_id: String => Text, Required;
            session_id: String => Text, Required;
            event_type: String => Text, Required;
            event_data: serde_json::Value => Json, Required;
            event_source: String => Text, Required;
            log_level: String => Text, Required;
            app_version: Option<String> => Text, Optional;
            created_at: Option<DateTime<Utc>> => Timestamp, Generated;
            updated_at: Option<DateTime<Utc>> => Timestamp, Generated;
        }
    }
}

/// Shapes of every declared table, in migration order.
pub fn declared_shapes() -> Vec<RecordShape> {
    vec![
        User::shape(),
        Session::shape(),
        Recording::shape(),
        Algo::shape(),
        EventLog::shape(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Record, WriteMode};
    use serde_json::json;

    #[test]
    fn test_declared_shapes_are_valid() {
        let shapes = declared_shapes();
        assert_eq!(shapes.len(), 5);
        for shape in &shapes {
            assert!(shape.check().is_ok(), "{} failed check", shape.table());
        }

        let tables: Vec<&str> = shapes.iter().map(|s| s.table()).collect();
        assert_eq!(
            tables,
            vec!["users", "sessions", "recordings", "algos", "event_log"]
        );
    }

    #[test]
    fn test_json_field_sets() {
        let users = User::shape();
        assert!(users.is_json_field("firebase_data"));
        assert!(users.is_json_field("body_data"));
        assert!(Session::shape().is_json_field("exercises_data"));
        assert!(EventLog::shape().is_json_field("event_data"));
        assert!(Recording::shape().json_fields().is_empty());
        assert!(Algo::shape().json_fields().is_empty());
    }

    #[test]
    fn test_user_create_encoding() {
        let data = json!({
            "user_id": "u1",
            "firebase_data": {"email": "a@b.com"},
            "body_data": {}
        });
        let values = User::shape()
            .encode(data.as_object().unwrap(), WriteMode::Create)
            .unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0].0, "user_id");
    }

    #[test]
    fn test_event_log_without_id_encodes() {
        let event = EventLog {
            event_id: None,
            ts: Utc::now(),
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            event_type: "tap".to_string(),
            event_data: json!({"x": 1}),
            event_source: "ios".to_string(),
            log_level: "info".to_string(),
            app_version: None,
            created_at: None,
            updated_at: None,
        };
        let record = Record::from_typed(&event).unwrap();
        let values = EventLog::shape()
            .encode(record.as_map(), WriteMode::Create)
            .unwrap();
        assert!(values.iter().all(|(c, _)| c != "event_id"));
        assert!(values.iter().any(|(c, _)| c == "app_version"));
    }
}
