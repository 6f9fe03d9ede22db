//! Frozen QWERTY keyboard tables
//!
//! Hand, row and finger classification for normalized keys. The tables
//! are part of the feature schema: changing membership changes feature
//! semantics and requires a FEATURE_VERSION bump in `features::layout`.
//!
//! Keys outside these tables still contribute to aggregate dwell/flight
//! statistics but not to per-hand/row/finger sums.

/// Keys typed with the left hand.
pub const LEFT_HAND: &[&str] = &[
    "q", "w", "e", "r", "t", "a", "s", "d", "f", "g", "z", "x", "c", "v", "b",
    "1", "2", "3", "4", "5", "`", "~",
];

/// Keys typed with the right hand.
pub const RIGHT_HAND: &[&str] = &[
    "y", "u", "i", "o", "p", "h", "j", "k", "l", "n", "m",
    "6", "7", "8", "9", "0", "-", "=", "[", "]", "\\", ";", "'", ",", ".", "/",
];

/// Home row keys.
pub const HOME_ROW: &[&str] = &["a", "s", "d", "f", "g", "h", "j", "k", "l", ";"];

/// Top row keys.
pub const TOP_ROW: &[&str] = &["q", "w", "e", "r", "t", "y", "u", "i", "o", "p", "[", "]", "\\"];

/// Bottom row keys.
pub const BOTTOM_ROW: &[&str] = &["z", "x", "c", "v", "b", "n", "m", ",", ".", "/"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hand {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row {
    Top,
    Home,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finger {
    Pinky,
    Ring,
    Middle,
    Index,
    Thumb,
}

/// Classify a normalized key by hand. None for unclassified keys.
pub fn hand_of(key: &str) -> Option<Hand> {
    if LEFT_HAND.contains(&key) {
        Some(Hand::Left)
    } else if RIGHT_HAND.contains(&key) {
        Some(Hand::Right)
    } else {
        None
    }
}

/// Classify a normalized key by row. None for unclassified keys.
pub fn row_of(key: &str) -> Option<Row> {
    if HOME_ROW.contains(&key) {
        Some(Row::Home)
    } else if TOP_ROW.contains(&key) {
        Some(Row::Top)
    } else if BOTTOM_ROW.contains(&key) {
        Some(Row::Bottom)
    } else {
        None
    }
}

/// Classify a normalized key by finger. `"Space"` is the thumb; letters,
/// digits and lateral punctuation follow standard touch-typing columns.
pub fn finger_of(key: &str) -> Option<Finger> {
    match key {
        "Space" => Some(Finger::Thumb),
        "q" | "a" | "z" | "1" | "`" | "~" | "p" | ";" | "/" | "0" | "-" | "=" | "[" | "]"
        | "'" | "\\" => Some(Finger::Pinky),
        "w" | "s" | "x" | "2" | "o" | "l" | "." | "9" => Some(Finger::Ring),
        "e" | "d" | "c" | "3" | "i" | "k" | "," | "8" => Some(Finger::Middle),
        "r" | "f" | "v" | "t" | "g" | "b" | "4" | "5" | "y" | "h" | "n" | "u" | "j" | "m"
        | "6" | "7" => Some(Finger::Index),
        _ => None,
    }
}
