//! RoomState types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label for a detected person whose face was not matched
pub const UNKNOWN_LABEL: &str = "unknown";

/// Label for a detected person when recognition failed for the whole frame
pub const PERSON_LABEL: &str = "person";

/// Multiset of labels for the people currently in the room
///
/// Order is irrelevant; repeated labels are kept so that two unidentified
/// people count as two.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct PresenceSet {
    labels: BTreeMap<String, usize>,
}

impl PresenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>) {
        *self.labels.entry(label.into()).or_insert(0) += 1;
    }

    /// Total number of entries, counting repeats
    pub fn len(&self) -> usize {
        self.labels.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains_key(label)
    }

    pub fn occurrences(&self, label: &str) -> usize {
        self.labels.get(label).copied().unwrap_or(0)
    }

    /// Sorted labels, repeats included
    pub fn to_vec(&self) -> Vec<String> {
        self.labels
            .iter()
            .flat_map(|(label, n)| std::iter::repeat(label.clone()).take(*n))
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for PresenceSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for label in iter {
            set.insert(label);
        }
        set
    }
}

impl From<Vec<String>> for PresenceSet {
    fn from(labels: Vec<String>) -> Self {
        labels.into_iter().collect()
    }
}

impl From<PresenceSet> for Vec<String> {
    fn from(set: PresenceSet) -> Self {
        set.to_vec()
    }
}

/// Actuator LEDs on the remote device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedKind {
    /// White: someone is in the room
    Presence,
    /// Blue: accent light
    Accent,
    /// Green: last access granted
    Granted,
    /// Red: last access denied
    Denied,
}

impl LedKind {
    pub const ALL: [LedKind; 4] = [
        LedKind::Presence,
        LedKind::Accent,
        LedKind::Granted,
        LedKind::Denied,
    ];

    /// Parse a path segment; accepts role names and device colors
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "presence" | "white" | "branco" => Some(LedKind::Presence),
            "accent" | "blue" | "azul" => Some(LedKind::Accent),
            "granted" | "green" | "verde" => Some(LedKind::Granted),
            "denied" | "red" | "vermelho" => Some(LedKind::Denied),
            _ => None,
        }
    }

    /// Color used in the device endpoint `/led_<color>`
    pub fn device_color(&self) -> &'static str {
        match self {
            LedKind::Presence => "white",
            LedKind::Accent => "blue",
            LedKind::Granted => "green",
            LedKind::Denied => "red",
        }
    }
}

impl std::fmt::Display for LedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LedKind::Presence => "presence",
            LedKind::Accent => "accent",
            LedKind::Granted => "granted",
            LedKind::Denied => "denied",
        };
        f.write_str(name)
    }
}

/// Sensor readings pushed by the remote device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorReadings {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub last_rfid: Option<String>,
}

impl SensorReadings {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none() && self.last_rfid.is_none()
    }
}

/// Raw sensor push body as sent by the device firmware
///
/// Readings may arrive as numbers or numeric strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SensorPush {
    #[serde(default, alias = "temperatura")]
    pub temperature: Option<serde_json::Value>,
    #[serde(default, alias = "umidade")]
    pub humidity: Option<serde_json::Value>,
    #[serde(default, alias = "ultimo_rfid")]
    pub last_rfid: Option<serde_json::Value>,
}

impl SensorPush {
    /// Convert into readings; returns the rejected fields as `(field, raw)`
    pub fn into_readings(self) -> (SensorReadings, Vec<(&'static str, String)>) {
        let mut rejected = Vec::new();

        let temperature = parse_reading("temperature", self.temperature, &mut rejected);
        let humidity = parse_reading("humidity", self.humidity, &mut rejected);

        let last_rfid = match self.last_rfid {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        (
            SensorReadings {
                temperature,
                humidity,
                last_rfid,
            },
            rejected,
        )
    }
}

fn parse_reading(
    field: &'static str,
    raw: Option<serde_json::Value>,
    rejected: &mut Vec<(&'static str, String)>,
) -> Option<f64> {
    let value = match raw {
        None | Some(serde_json::Value::Null) => return None,
        Some(v) => v,
    };

    let parsed = match &value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite());

    if parsed.is_none() {
        rejected.push((field, value.to_string()));
    }
    parsed
}

/// The singleton room record
///
/// `people_count` and `has_presence` are derived from `detected_people` and
/// can only change through [`RoomState::set_presence`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomState {
    detected_people: PresenceSet,
    people_count: u32,
    has_presence: bool,
    pub temperature: f64,
    pub humidity: f64,
    pub last_rfid: String,
    pub light_presence: bool,
    pub light_accent: bool,
    pub light_granted: bool,
    pub light_denied: bool,
    pub last_update: DateTime<Utc>,
}

impl Default for RoomState {
    fn default() -> Self {
        Self {
            detected_people: PresenceSet::new(),
            people_count: 0,
            has_presence: false,
            temperature: 0.0,
            humidity: 0.0,
            last_rfid: String::new(),
            light_presence: false,
            light_accent: false,
            light_granted: false,
            light_denied: false,
            last_update: Utc::now(),
        }
    }
}

impl RoomState {
    pub fn detected_people(&self) -> &PresenceSet {
        &self.detected_people
    }

    pub fn people_count(&self) -> u32 {
        self.people_count
    }

    pub fn has_presence(&self) -> bool {
        self.has_presence
    }

    /// Replace the present set and recompute the derived fields
    pub fn set_presence(&mut self, people: PresenceSet) {
        self.people_count = people.len() as u32;
        self.has_presence = self.people_count > 0;
        self.detected_people = people;
    }

    pub fn invariant_holds(&self) -> bool {
        self.people_count as usize == self.detected_people.len()
            && self.has_presence == (self.people_count > 0)
    }

    pub fn led(&self, kind: LedKind) -> bool {
        match kind {
            LedKind::Presence => self.light_presence,
            LedKind::Accent => self.light_accent,
            LedKind::Granted => self.light_granted,
            LedKind::Denied => self.light_denied,
        }
    }

    pub fn set_led(&mut self, kind: LedKind, on: bool) {
        match kind {
            LedKind::Presence => self.light_presence = on,
            LedKind::Accent => self.light_accent = on,
            LedKind::Granted => self.light_granted = on,
            LedKind::Denied => self.light_denied = on,
        }
    }

    /// Set the access LEDs for a verdict; deny is the exact reverse of grant
    pub fn apply_verdict(&mut self, granted: bool) {
        self.light_accent = granted;
        self.light_granted = granted;
        self.light_denied = !granted;
    }

    /// Apply the readings that are present, leave the others untouched
    pub fn apply_readings(&mut self, readings: &SensorReadings) {
        if let Some(t) = readings.temperature {
            self.temperature = t;
        }
        if let Some(h) = readings.humidity {
            self.humidity = h;
        }
        if let Some(ref rfid) = readings.last_rfid {
            self.last_rfid = rfid.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_presence_set_keeps_repeats() {
        let set: PresenceSet = ["unknown", "Israel", "unknown"].into_iter().collect();
        assert_eq!(set.len(), 3);
        assert_eq!(set.occurrences(UNKNOWN_LABEL), 2);
        assert!(set.contains("Israel"));
        assert_eq!(set.to_vec(), vec!["Israel", "unknown", "unknown"]);
    }

    #[test]
    fn test_presence_set_ignores_order() {
        let a: PresenceSet = ["b", "a"].into_iter().collect();
        let b: PresenceSet = ["a", "b"].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_set_presence_recomputes_count_and_flag() {
        let mut state = RoomState::default();
        assert!(state.invariant_holds());
        assert!(!state.has_presence());

        state.set_presence(["Israel", "unknown"].into_iter().collect());
        assert_eq!(state.people_count(), 2);
        assert!(state.has_presence());
        assert!(state.invariant_holds());

        state.set_presence(PresenceSet::new());
        assert_eq!(state.people_count(), 0);
        assert!(!state.has_presence());
        assert!(state.invariant_holds());
    }

    #[test]
    fn test_apply_verdict() {
        let mut state = RoomState::default();
        state.apply_verdict(true);
        assert!(state.light_accent && state.light_granted && !state.light_denied);

        state.apply_verdict(false);
        assert!(!state.light_accent && !state.light_granted && state.light_denied);
    }

    #[test]
    fn test_led_parse() {
        assert_eq!(LedKind::parse("presence"), Some(LedKind::Presence));
        assert_eq!(LedKind::parse("Blue"), Some(LedKind::Accent));
        assert_eq!(LedKind::parse("vermelho"), Some(LedKind::Denied));
        assert_eq!(LedKind::parse("purple"), None);
        assert_eq!(LedKind::Granted.device_color(), "green");
    }

    #[test]
    fn test_sensor_push_accepts_strings_and_aliases() {
        let push: SensorPush = serde_json::from_value(json!({
            "temperatura": "23.5",
            "umidade": 61,
            "ultimo_rfid": "6C3ACB33"
        }))
        .unwrap();

        let (readings, rejected) = push.into_readings();
        assert!(rejected.is_empty());
        assert_eq!(readings.temperature, Some(23.5));
        assert_eq!(readings.humidity, Some(61.0));
        assert_eq!(readings.last_rfid.as_deref(), Some("6C3ACB33"));
    }

    #[test]
    fn test_sensor_push_rejects_non_numeric() {
        let push: SensorPush = serde_json::from_value(json!({
            "temperature": "hot",
            "humidity": null
        }))
        .unwrap();

        let (readings, rejected) = push.into_readings();
        assert_eq!(readings.temperature, None);
        assert_eq!(readings.humidity, None);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].0, "temperature");
    }

    #[test]
    fn test_apply_readings_partial() {
        let mut state = RoomState::default();
        state.humidity = 40.0;
        state.apply_readings(&SensorReadings {
            temperature: Some(21.0),
            ..Default::default()
        });
        assert_eq!(state.temperature, 21.0);
        assert_eq!(state.humidity, 40.0);
    }

    #[test]
    fn test_serializes_people_as_list() {
        let mut state = RoomState::default();
        state.set_presence(["unknown", "unknown"].into_iter().collect());
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["detected_people"], json!(["unknown", "unknown"]));
        assert_eq!(value["people_count"], json!(2));
        assert_eq!(value["has_presence"], json!(true));
    }
}
