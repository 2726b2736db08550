use super::*;
use serde_json::json;

#[test]
fn test_entity_set_preserves_insertion_order() {
    let set = EntitySet::new(["G3", "G1", "G2"]).unwrap();
    let ids: Vec<&str> = set.iter().map(|e| e.id()).collect();
    assert_eq!(ids, vec!["G3", "G1", "G2"]);
    assert_eq!(set.len(), 3);
    assert!(set.contains("G1"));
    assert!(!set.contains("G4"));
}

#[test]
fn test_entity_set_trims_ids() {
    let set = EntitySet::new([" G1 ", "G2"]).unwrap();
    assert_eq!(set.iter().next().unwrap().id(), "G1");
}

#[test]
fn test_entity_set_rejects_duplicates() {
    let result = EntitySet::new(["G1", "G2", "G1"]);
    assert_eq!(result.unwrap_err(), ConfigError::DuplicateEntity("G1".to_string()));
}

#[test]
fn test_entity_set_rejects_blank_id() {
    let result = EntitySet::new(["G1", "  "]);
    assert_eq!(result.unwrap_err(), ConfigError::BlankEntity);
}

#[test]
fn test_entity_set_rejects_empty() {
    let result = EntitySet::new(Vec::<String>::new());
    assert_eq!(result.unwrap_err(), ConfigError::NoEntities);
}

#[test]
fn test_reading_serializes_with_stable_field_names() {
    let set = EntitySet::new(["G1"]).unwrap();
    let entity = set.iter().next().unwrap();
    let reading = Reading::new(entity, 21, 1707668400);

    let value = serde_json::to_value(&reading).unwrap();
    assert_eq!(
        value,
        json!({"entity_id": "G1", "value": 21, "timestamp": 1707668400})
    );
}

#[test]
fn test_reading_display_includes_all_fields() {
    let set = EntitySet::new(["G2"]).unwrap();
    let reading = Reading::new(set.iter().next().unwrap(), 85, 42);
    assert_eq!(reading.to_string(), "{entity_id: G2, value: 85, timestamp: 42}");
}
