//! Tests for the local profile and history store.

use super::*;
use bus_lens_core::PropertyType;
use tempfile::TempDir;

const CONNECTION: &str =
    "Endpoint=sb://x.servicebus.windows.net/;SharedAccessKeyName=k;SharedAccessKey=v=";

fn sent(body: &str) -> HistoryEntry {
    HistoryEntry::record(
        &Destination::queue("orders"),
        &OutboundMessage::new(body),
        None,
    )
}

mod connection_tests {
    use super::*;

    #[test]
    fn test_profile_parses_connection_string() {
        let profile = ConnectionProfile::new("prod", CONNECTION).unwrap();

        assert_eq!(profile.endpoint, "sb://x.servicebus.windows.net/");
        assert_eq!(profile.key_name, "k");
        assert_eq!(profile.key_value, "v=");
        assert_eq!(profile.credentials().key_value(), "v=");
    }

    #[test]
    fn test_profile_rejects_incomplete_connection_string() {
        let result = ConnectionProfile::new("bad", "Endpoint=sb://x/");

        assert!(matches!(result, Err(StoreError::InvalidConnectionString(_))));
    }

    #[test]
    fn test_saved_connections_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let profile = ConnectionProfile::new("prod", CONNECTION).unwrap();

        let mut store = LocalStore::open(dir.path()).unwrap();
        store.save_connection(profile.clone()).unwrap();
        store.select_connection("prod").unwrap();

        let reopened = LocalStore::open(dir.path()).unwrap();
        assert_eq!(reopened.connections(), &[profile.clone()]);
        assert_eq!(reopened.selected_connection(), Some(&profile));
    }

    #[test]
    fn test_save_with_same_id_replaces() {
        let dir = TempDir::new().unwrap();
        let mut store = LocalStore::open(dir.path()).unwrap();
        let mut profile = ConnectionProfile::new("prod", CONNECTION).unwrap();
        store.save_connection(profile.clone()).unwrap();

        profile.name = "production".to_string();
        store.save_connection(profile.clone()).unwrap();

        assert_eq!(store.connections().len(), 1);
        assert_eq!(store.connections()[0].name, "production");
    }

    #[test]
    fn test_find_by_id_or_name() {
        let dir = TempDir::new().unwrap();
        let mut store = LocalStore::open(dir.path()).unwrap();
        let profile = ConnectionProfile::new("prod", CONNECTION).unwrap();
        store.save_connection(profile.clone()).unwrap();

        assert_eq!(store.find_connection(&profile.id).unwrap().name, "prod");
        assert_eq!(store.find_connection("prod").unwrap().id, profile.id);
        assert!(matches!(
            store.find_connection("staging"),
            Err(StoreError::ConnectionNotFound(_))
        ));
    }

    #[test]
    fn test_deleting_selected_connection_clears_selection() {
        let dir = TempDir::new().unwrap();
        let mut store = LocalStore::open(dir.path()).unwrap();
        store
            .save_connection(ConnectionProfile::new("prod", CONNECTION).unwrap())
            .unwrap();
        store.select_connection("prod").unwrap();

        store.delete_connection("prod").unwrap();

        assert!(store.connections().is_empty());
        assert_eq!(store.selected_connection(), None);
        assert_eq!(LocalStore::open(dir.path()).unwrap().selected_connection(), None);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("connections.json"), "{not json").unwrap();

        let result = LocalStore::open(dir.path());

        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }
}

mod history_tests {
    use super::*;

    #[test]
    fn test_history_is_newest_first() {
        let dir = TempDir::new().unwrap();
        let mut store = LocalStore::open(dir.path()).unwrap();

        store.record_message(sent("first")).unwrap();
        store.record_message(sent("second")).unwrap();

        let bodies: Vec<_> = store.history().iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["second", "first"]);
    }

    #[test]
    fn test_history_is_capped() {
        let dir = TempDir::new().unwrap();
        let mut store = LocalStore::open(dir.path()).unwrap();

        for i in 0..MAX_HISTORY_ENTRIES + 5 {
            store.history.insert(0, sent(&i.to_string()));
        }
        store.record_message(sent("latest")).unwrap();

        assert_eq!(store.history().len(), MAX_HISTORY_ENTRIES);
        assert_eq!(store.history()[0].body, "latest");
    }

    #[test]
    fn test_clear_history_persists() {
        let dir = TempDir::new().unwrap();
        let mut store = LocalStore::open(dir.path()).unwrap();
        store.record_message(sent("x")).unwrap();

        store.clear_history().unwrap();

        assert!(LocalStore::open(dir.path()).unwrap().history().is_empty());
    }

    #[test]
    fn test_entry_rebuilds_outbound_message() {
        let message = OutboundMessage::new("{}")
            .with_subject("s")
            .with_property(MessageProperty::new("n", "1", PropertyType::Int));
        let entry = HistoryEntry::record(&Destination::topic("events"), &message, None);

        assert_eq!(entry.to_outbound(), message);
        assert_eq!(entry.destination(), Destination::topic("events"));
    }

    #[test]
    fn test_find_message_by_id() {
        let dir = TempDir::new().unwrap();
        let mut store = LocalStore::open(dir.path()).unwrap();
        let entry = sent("x");
        store.record_message(entry.clone()).unwrap();

        assert_eq!(store.find_message(&entry.id).unwrap(), &entry);
        assert!(store.find_message("nope").is_err());
    }
}

mod export_tests {
    use super::*;

    #[test]
    fn test_export_then_import_into_fresh_store() {
        let source_dir = TempDir::new().unwrap();
        let mut source = LocalStore::open(source_dir.path()).unwrap();
        source
            .save_connection(ConnectionProfile::new("prod", CONNECTION).unwrap())
            .unwrap();
        source.record_message(sent("x")).unwrap();

        let json = source.export_json().unwrap();
        let target_dir = TempDir::new().unwrap();
        let mut target = LocalStore::open(target_dir.path()).unwrap();
        let summary = target.import_json(&json).unwrap();

        assert_eq!(summary.connections, Some(1));
        assert_eq!(summary.messages, Some(1));
        assert_eq!(target.connections(), source.connections());
        assert_eq!(target.history(), source.history());
    }

    #[test]
    fn test_export_uses_camel_case_sections() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        let json: serde_json::Value = serde_json::from_str(&store.export_json().unwrap()).unwrap();

        assert!(json.get("connections").is_some());
        assert!(json.get("messageHistory").is_some());
    }

    #[test]
    fn test_import_replaces_only_present_sections() {
        let dir = TempDir::new().unwrap();
        let mut store = LocalStore::open(dir.path()).unwrap();
        store
            .save_connection(ConnectionProfile::new("prod", CONNECTION).unwrap())
            .unwrap();
        store.record_message(sent("kept?")).unwrap();

        let summary = store.import_json(r#"{"messageHistory": []}"#).unwrap();

        assert_eq!(summary.connections, None);
        assert_eq!(summary.messages, Some(0));
        assert_eq!(store.connections().len(), 1);
        assert!(store.history().is_empty());
    }

    #[test]
    fn test_malformed_import_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut store = LocalStore::open(dir.path()).unwrap();
        store
            .save_connection(ConnectionProfile::new("prod", CONNECTION).unwrap())
            .unwrap();

        let result = store.import_json("{ nope");

        assert!(matches!(result, Err(StoreError::InvalidImport(_))));
        assert_eq!(store.connections().len(), 1);
    }

    #[test]
    fn test_import_accepts_untyped_properties() {
        let dir = TempDir::new().unwrap();
        let mut store = LocalStore::open(dir.path()).unwrap();
        let json = r#"{"messageHistory": [{
            "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "body": "hi",
            "properties": [{"key": "k", "value": "v"}],
            "sentAt": "2024-01-02T03:04:05Z",
            "destination": "orders",
            "destinationType": "queue"
        }]}"#;

        store.import_json(json).unwrap();

        let entry = &store.history()[0];
        assert_eq!(entry.properties, vec![MessageProperty::string("k", "v")]);
        assert_eq!(entry.destination_kind, EntityKind::Queue);
    }

    #[test]
    fn test_import_accepts_timestamp_ids_and_epoch_millis() {
        let dir = TempDir::new().unwrap();
        let mut store = LocalStore::open(dir.path()).unwrap();
        let json = r#"{
            "connections": [{
                "id": "1715000000000",
                "name": "legacy",
                "connectionString": "Endpoint=sb://x/;SharedAccessKeyName=k;SharedAccessKey=v",
                "endpoint": "sb://x/",
                "keyName": "k",
                "keyValue": "v"
            }],
            "messageHistory": [{
                "id": "1715000000001",
                "body": "hi",
                "sentAt": 1715000000001,
                "destination": "orders",
                "destinationType": "queue"
            }]
        }"#;

        let summary = store.import_json(json).unwrap();

        assert_eq!(summary.connections, Some(1));
        assert_eq!(summary.messages, Some(1));
        assert_eq!(store.find_connection("1715000000000").unwrap().name, "legacy");
        let sent_at = store.find_message("1715000000001").unwrap().sent_at;
        assert_eq!(sent_at.timestamp_millis(), 1_715_000_000_001);

        store.select_connection("1715000000000").unwrap();
        let reopened = LocalStore::open(dir.path()).unwrap();
        assert_eq!(reopened.selected_connection().unwrap().name, "legacy");
        assert_eq!(reopened.history()[0].sent_at, sent_at);
    }

    #[test]
    fn test_import_rejects_unreadable_sent_at() {
        let dir = TempDir::new().unwrap();
        let mut store = LocalStore::open(dir.path()).unwrap();
        let json = r#"{"messageHistory": [{
            "id": "1",
            "body": "hi",
            "sentAt": "last tuesday",
            "destination": "orders",
            "destinationType": "queue"
        }]}"#;

        assert!(matches!(
            store.import_json(json),
            Err(StoreError::InvalidImport(_))
        ));
    }
}
