use super::StreamId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field holding the application-serialized payload of an entry
pub const PAYLOAD_FIELD: &str = "payload";

/// Field map of a stream entry
pub type Fields = BTreeMap<String, String>;

/// One raw stream entry as returned by a `LogStore`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: StreamId,
    pub fields: Fields,
}

impl Entry {
    pub fn new(id: StreamId, fields: Fields) -> Self {
        Self { id, fields }
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn payload(&self) -> Option<&str> {
        self.field(PAYLOAD_FIELD)
    }
}

/// Build the field map for an entry carrying only a payload
pub fn payload_fields(payload: impl Into<String>) -> Fields {
    let mut fields = Fields::new();
    fields.insert(PAYLOAD_FIELD.to_string(), payload.into());
    fields
}
