// SPDX-License-Identifier: Apache-2.0

//! Reading extraction from per-meter JSON line files.

use serde_json::Value;
use tracing::warn;

/// One decoded meter reading line. `raw` is the original line, forwarded
/// untouched so the gateway sees exactly what the meter reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterReading {
    pub id: String,
    pub name: String,
    pub raw: String,
}

/// Parse one line of a per-meter reading file.
///
/// `id` and `name` must both be present and string-typed. Anything else is
/// logged and dropped; a bad line never stops the stream.
pub fn extract(line: &str) -> Option<MeterReading> {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!(line, error = %e, "unable to parse meter reading line");
            return None;
        }
    };

    let id = match value.get("id").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => {
            warn!(line, "meter reading line missing string field id");
            return None;
        }
    };
    let name = match value.get("name").and_then(Value::as_str) {
        Some(name) => name.to_string(),
        None => {
            warn!(line, "meter reading line missing string field name");
            return None;
        }
    };

    Some(MeterReading {
        id,
        name,
        raw: line.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_and_name() {
        let line = r#"{"id":"M1","name":"Meter One","extra":1}"#;
        let reading = extract(line).unwrap();
        assert_eq!(reading.id, "M1");
        assert_eq!(reading.name, "Meter One");
        assert_eq!(reading.raw, line);
    }

    #[test]
    fn missing_name_is_dropped() {
        assert_eq!(extract(r#"{"id":"M1"}"#), None);
    }

    #[test]
    fn missing_id_is_dropped() {
        assert_eq!(extract(r#"{"name":"Meter One"}"#), None);
    }

    #[test]
    fn non_string_fields_are_dropped() {
        assert_eq!(extract(r#"{"id":7,"name":"Meter One"}"#), None);
        assert_eq!(extract(r#"{"id":"M1","name":null}"#), None);
    }

    #[test]
    fn invalid_json_is_dropped() {
        assert_eq!(extract("not json at all"), None);
        assert_eq!(extract(""), None);
    }
}
