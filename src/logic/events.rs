//! Keystroke event model and normalization
//!
//! Raw client events arrive as (key, timestamp, kind) triples. Before
//! any feature work they pass through [`normalize_events`]: stable sort
//! by timestamp, key canonicalization, and removal of `keyup` events
//! that never saw a matching `keydown`.

use serde::{Deserialize, Serialize};

/// Press or release of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEventKind {
    Keydown,
    Keyup,
}

/// One timestamped keyboard event as submitted by a client.
///
/// Timestamps are milliseconds, session-relative or wall-clock; only
/// differences between them matter downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeystrokeEvent {
    pub key: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: KeyEventKind,
}

impl KeystrokeEvent {
    pub fn keydown(key: &str, timestamp: i64) -> Self {
        Self {
            key: key.to_string(),
            timestamp,
            kind: KeyEventKind::Keydown,
        }
    }

    pub fn keyup(key: &str, timestamp: i64) -> Self {
        Self {
            key: key.to_string(),
            timestamp,
            kind: KeyEventKind::Keyup,
        }
    }
}

/// Canonicalize a key name. Idempotent.
///
/// A literal space (and any casing of the word "space") becomes the
/// sentinel `"Space"`; every other key is lower-cased.
pub fn normalize_key(key: &str) -> String {
    if key == " " || key.eq_ignore_ascii_case("space") {
        return "Space".to_string();
    }
    key.to_lowercase()
}

/// Normalize an event stream: stable sort by timestamp ascending,
/// canonicalize keys, and drop `keyup` events whose matching `keydown`
/// was not observed since the last matching `keyup`.
///
/// Decreasing or non-positive timestamps survive normalization; the
/// interval validity window in feature extraction handles them.
pub fn normalize_events(events: &[KeystrokeEvent]) -> Vec<KeystrokeEvent> {
    let mut sorted: Vec<KeystrokeEvent> = events
        .iter()
        .map(|e| KeystrokeEvent {
            key: normalize_key(&e.key),
            timestamp: e.timestamp,
            kind: e.kind,
        })
        .collect();
    sorted.sort_by_key(|e| e.timestamp);

    let mut open: std::collections::HashMap<String, u32> = std::collections::HashMap::new();
    let mut result = Vec::with_capacity(sorted.len());

    for event in sorted {
        match event.kind {
            KeyEventKind::Keydown => {
                *open.entry(event.key.clone()).or_insert(0) += 1;
                result.push(event);
            }
            KeyEventKind::Keyup => {
                match open.get_mut(&event.key) {
                    Some(count) if *count > 0 => {
                        *count -= 1;
                        result.push(event);
                    }
                    // Orphan keyup: silently dropped
                    _ => {}
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key_lowercases() {
        assert_eq!(normalize_key("A"), "a");
        assert_eq!(normalize_key("Backspace"), "backspace");
    }

    #[test]
    fn test_normalize_key_space_sentinel() {
        assert_eq!(normalize_key(" "), "Space");
        assert_eq!(normalize_key("space"), "Space");
    }

    #[test]
    fn test_normalize_key_idempotent() {
        for key in [" ", "Space", "A", "Shift", "backspace"] {
            let once = normalize_key(key);
            assert_eq!(normalize_key(&once), once);
        }
    }

    #[test]
    fn test_events_sorted_by_timestamp() {
        let events = vec![
            KeystrokeEvent::keydown("b", 200),
            KeystrokeEvent::keydown("a", 100),
        ];
        let normalized = normalize_events(&events);
        assert_eq!(normalized[0].key, "a");
        assert_eq!(normalized[1].key, "b");
    }

    #[test]
    fn test_sort_is_stable() {
        // Two events at the same timestamp keep submission order.
        let events = vec![
            KeystrokeEvent::keydown("x", 100),
            KeystrokeEvent::keydown("y", 100),
        ];
        let normalized = normalize_events(&events);
        assert_eq!(normalized[0].key, "x");
        assert_eq!(normalized[1].key, "y");
    }

    #[test]
    fn test_orphan_keyup_dropped() {
        let events = vec![
            KeystrokeEvent::keyup("a", 50),
            KeystrokeEvent::keydown("a", 100),
            KeystrokeEvent::keyup("a", 180),
        ];
        let normalized = normalize_events(&events);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].kind, KeyEventKind::Keydown);
        assert_eq!(normalized[1].kind, KeyEventKind::Keyup);
    }

    #[test]
    fn test_double_keyup_keeps_first_only() {
        let events = vec![
            KeystrokeEvent::keydown("a", 100),
            KeystrokeEvent::keyup("a", 180),
            KeystrokeEvent::keyup("a", 220),
        ];
        let normalized = normalize_events(&events);
        assert_eq!(normalized.len(), 2);
    }

    #[test]
    fn test_nested_presses_of_same_key() {
        // Key auto-repeat can emit two keydowns before the keyup.
        let events = vec![
            KeystrokeEvent::keydown("a", 100),
            KeystrokeEvent::keydown("a", 130),
            KeystrokeEvent::keyup("a", 180),
            KeystrokeEvent::keyup("a", 200),
        ];
        let normalized = normalize_events(&events);
        assert_eq!(normalized.len(), 4);
    }

    #[test]
    fn test_event_json_shape() {
        let event = KeystrokeEvent::keydown("a", 42);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["key"], "a");
        assert_eq!(json["timestamp"], 42);
        assert_eq!(json["type"], "keydown");
    }
}
