//! Remotely identified records that take part in selection and action resolution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A record identified by an opaque, stable, unique key.
///
/// The key is all the reconciler needs; every other attribute is payload
/// carried along untouched.
pub trait Entity: Clone {
    fn id(&self) -> &str;
}

/// A user who can be granted permission on an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    #[serde(alias = "iamUserId")]
    pub id: String,
    #[serde(default)]
    pub login_name: String,
    #[serde(default)]
    pub real_name: String,
}

impl Member {
    pub fn new(id: &str, login_name: &str, real_name: &str) -> Self {
        Self {
            id: id.to_string(),
            login_name: login_name.to_string(),
            real_name: real_name.to_string(),
        }
    }

    /// Text shown on the member's tag once selected: `"{login} {real name}"`.
    pub fn tag_label(&self) -> String {
        format!("{} {}", self.login_name, self.real_name)
    }
}

impl Entity for Member {
    fn id(&self) -> &str {
        &self.id
    }
}

/// An entity of unknown kind: an id plus whatever attributes came with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Record {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: serde_json::Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }
}

impl Entity for Record {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_accepts_remote_field_names() {
        let member: Member = serde_json::from_value(serde_json::json!({
            "iamUserId": "42",
            "loginName": "jdoe",
            "realName": "Jane Doe"
        }))
        .unwrap();
        assert_eq!(member.id(), "42");
        assert_eq!(member.tag_label(), "jdoe Jane Doe");
    }

    #[test]
    fn record_keeps_unknown_attributes() {
        let record: Record = serde_json::from_value(serde_json::json!({
            "id": "7",
            "region": "eu",
            "replicas": 3
        }))
        .unwrap();
        assert_eq!(record.id(), "7");
        assert_eq!(record.attributes["region"], "eu");
        assert_eq!(record.attributes["replicas"], 3);
    }
}
