use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use serde_json::{Value, json};

use crate::error::StoreError;
use crate::store::store_model::{PropertyValue, Record, StoreCapabilities, WireRecord};

/// Prefix applied to property names the store reserves for itself.
pub const RESERVED_PREFIX: &str = "userDefined:";

/// Store write contract, applied before any network write.
#[derive(Debug, Clone)]
pub struct SchemaRules {
    /// Character the store uses to split select options
    pub separator: char,
    pub separator_replacement: String,
    pub reserved_names: Vec<String>,
    pub max_option_len: usize,
    pub max_text_len: usize,
}

impl Default for SchemaRules {
    fn default() -> Self {
        Self {
            separator: ',',
            separator_replacement: "/".to_string(),
            reserved_names: ["id", "url", "created_time", "last_edited_time", "parent"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_option_len: 100,
            max_text_len: 2000,
        }
    }
}

fn schema_error(field: &str, reason: impl Into<String>) -> StoreError {
    StoreError::SchemaValidation {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn is_forbidden_control(c: char) -> bool {
    c.is_control() && c != '\n' && c != '\t'
}

fn truncate_chars(raw: &str, max: usize) -> String {
    raw.chars().take(max).collect()
}

impl SchemaRules {
    /// Make a label safe to use as a select option.
    pub fn sanitize_option(&self, raw: &str) -> String {
        let cleaned: String = raw
            .chars()
            .filter(|c| !c.is_control())
            .collect::<String>()
            .replace(self.separator, &self.separator_replacement);

        let trimmed = truncate_chars(cleaned.trim(), self.max_option_len);
        if trimmed.trim().is_empty() {
            "(blank)".to_string()
        } else {
            trimmed.trim().to_string()
        }
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved_names.iter().any(|r| r.eq_ignore_ascii_case(name))
    }

    pub fn namespaced_property(&self, name: &str) -> String {
        if self.is_reserved(name) {
            format!("{}{}", RESERVED_PREFIX, name)
        } else {
            name.to_string()
        }
    }

    fn check_text(&self, field: &str, raw: &str) -> Result<String, StoreError> {
        if raw.chars().any(is_forbidden_control) {
            return Err(schema_error(field, "contains control characters"));
        }
        if raw.chars().count() > self.max_text_len {
            return Err(schema_error(field, format!("longer than {} characters", self.max_text_len)));
        }
        Ok(raw.to_string())
    }

    /// Native array when the store supports it, otherwise a JSON string.
    fn encode_list(&self, kind: &str, items: Vec<String>, caps: &StoreCapabilities) -> Result<Value, StoreError> {
        let payload = if caps.native_multi_value {
            Value::from(items)
        } else {
            Value::String(serde_json::to_string(&items)?)
        };

        let mut object = serde_json::Map::new();
        object.insert(kind.to_string(), payload);
        Ok(Value::Object(object))
    }

    /// Validate and encode a record for the wire.
    ///
    /// Select options are sanitized rather than rejected; everything else
    /// that violates the contract is a `SchemaValidation` error.
    pub fn validate(&self, record: &Record, caps: &StoreCapabilities) -> Result<WireRecord, StoreError> {
        let mut properties = BTreeMap::new();
        let mut titles = 0;

        for (raw_name, value) in &record.properties {
            let name = self.namespaced_property(raw_name);
            if name.trim().is_empty() {
                return Err(schema_error(raw_name, "empty property name"));
            }
            if name.starts_with("date:") {
                return Err(schema_error(&name, "the date: prefix is reserved for date encoding"));
            }

            match value {
                PropertyValue::Title(s) => {
                    titles += 1;
                    let s = self.check_text(&name, s)?;
                    if s.trim().is_empty() {
                        return Err(schema_error(&name, "title is empty"));
                    }
                    properties.insert(name, json!({ "title": s }));
                }
                PropertyValue::Text(s) => {
                    let s = self.check_text(&name, s)?;
                    properties.insert(name, json!({ "text": s }));
                }
                PropertyValue::Select(s) => {
                    properties.insert(name, json!({ "select": self.sanitize_option(s) }));
                }
                PropertyValue::MultiSelect(values) => {
                    let mut options: Vec<String> = Vec::new();
                    for v in values {
                        let option = self.sanitize_option(v);
                        if !options.contains(&option) {
                            options.push(option);
                        }
                    }
                    let encoded = self.encode_list("multi_select", options, caps)?;
                    properties.insert(name, encoded);
                }
                PropertyValue::Number(n) => {
                    if !n.is_finite() {
                        return Err(schema_error(&name, "number is not finite"));
                    }
                    properties.insert(name, json!({ "number": n }));
                }
                PropertyValue::Checkbox(b) => {
                    properties.insert(name, json!({ "checkbox": b }));
                }
                PropertyValue::Url(u) => {
                    if !(u.starts_with("http://") || u.starts_with("https://")) || u.chars().any(char::is_whitespace) {
                        return Err(schema_error(&name, format!("'{}' is not an absolute URL", u)));
                    }
                    properties.insert(name, json!({ "url": u }));
                }
                PropertyValue::Date { value, is_datetime } => {
                    let parsed = if *is_datetime {
                        DateTime::parse_from_rfc3339(value).is_ok()
                    } else {
                        NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
                    };
                    if !parsed {
                        return Err(schema_error(&name, format!("'{}' is not a valid date", value)));
                    }
                    let flag = if *is_datetime { 1 } else { 0 };
                    properties.insert(format!("date:{}:start", name), json!({ "date": value }));
                    properties.insert(format!("date:{}:is_datetime", name), json!({ "number": flag }));
                }
                PropertyValue::Relation(ids) => {
                    let ids = ids.iter().map(|id| id.0.clone()).collect();
                    let encoded = self.encode_list("relation", ids, caps)?;
                    properties.insert(name, encoded);
                }
            }
        }

        if titles != 1 {
            return Err(schema_error("title", format!("expected exactly one title property, found {}", titles)));
        }

        let content = match &record.content {
            Some(body) if body.chars().any(is_forbidden_control) => {
                return Err(schema_error("content", "contains control characters"));
            }
            other => other.clone(),
        };

        Ok(WireRecord { properties, content })
    }

    /// Aggressive cleanup used for the single retry after a rejection.
    pub fn strict_sanitize(&self, record: &Record) -> Record {
        let clean = |s: &str| -> String {
            let kept: String = s.chars().filter(|c| !is_forbidden_control(*c)).collect();
            truncate_chars(&kept, self.max_text_len)
        };

        let mut properties = BTreeMap::new();
        for (name, value) in &record.properties {
            let name = name.trim().to_string();
            if name.is_empty() || name.starts_with("date:") {
                continue;
            }

            let value = match value {
                PropertyValue::Title(s) => {
                    let s = clean(s).replace('\n', " ");
                    PropertyValue::Title(if s.trim().is_empty() { "Untitled".to_string() } else { s })
                }
                PropertyValue::Text(s) => PropertyValue::Text(clean(s)),
                PropertyValue::Select(s) => PropertyValue::Select(self.sanitize_option(s)),
                PropertyValue::MultiSelect(v) => {
                    PropertyValue::MultiSelect(v.iter().map(|s| self.sanitize_option(s)).collect())
                }
                PropertyValue::Number(n) if !n.is_finite() => continue,
                PropertyValue::Url(u) if !(u.starts_with("http://") || u.starts_with("https://")) => {
                    PropertyValue::Text(clean(u))
                }
                PropertyValue::Url(u) => PropertyValue::Url(u.split_whitespace().collect()),
                PropertyValue::Date { value, is_datetime } => {
                    let ok = if *is_datetime {
                        DateTime::parse_from_rfc3339(value).is_ok()
                    } else {
                        NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
                    };
                    if !ok {
                        continue;
                    }
                    PropertyValue::Date {
                        value: value.clone(),
                        is_datetime: *is_datetime,
                    }
                }
                other => other.clone(),
            };
            properties.insert(name, value);
        }

        Record {
            properties,
            content: record.content.as_deref().map(clean),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separator_is_replaced_not_rejected() {
        let rules = SchemaRules::default();
        assert_eq!(rules.sanitize_option("Last 7 days, hourly"), "Last 7 days/ hourly");
    }

    #[test]
    fn reserved_names_are_prefixed() {
        let rules = SchemaRules::default();
        assert_eq!(rules.namespaced_property("URL"), "userDefined:URL");
        assert_eq!(rules.namespaced_property("Role"), "Role");
    }

    #[test]
    fn dates_are_split_with_numeric_flag() {
        let rules = SchemaRules::default();
        let record = Record::new().title("Name", "Home").date("Captured", chrono::Utc::now());
        let wire = rules.validate(&record, &StoreCapabilities::default()).unwrap();
        assert!(wire.properties.contains_key("date:Captured:start"));
        assert_eq!(wire.properties["date:Captured:is_datetime"], json!({ "number": 1 }));
    }

    #[test]
    fn strict_sanitize_fixes_control_characters() {
        let rules = SchemaRules::default();
        let record = Record::new().title("Name", "Bad\u{0007}Label").number("Order", f64::NAN);
        assert!(rules.validate(&record, &StoreCapabilities::default()).is_err());

        let fixed = rules.strict_sanitize(&record);
        let wire = rules.validate(&fixed, &StoreCapabilities::default()).unwrap();
        assert_eq!(wire.properties["Name"], json!({ "title": "BadLabel" }));
        assert!(!wire.properties.contains_key("Order"));
    }
}
