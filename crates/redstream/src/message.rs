use redstream_core::{Entry, Fields, Result, StreamId};
use serde::de::{DeserializeOwned, Error as _};
use serde_json::Value;
use std::sync::OnceLock;

/// One delivered stream entry
///
/// The JSON payload is parsed on first access and kept for later calls.
#[derive(Debug, Clone)]
pub struct Message {
    entry: Entry,
    payload: OnceLock<Value>,
}

impl Message {
    pub fn new(entry: Entry) -> Self {
        Self {
            entry,
            payload: OnceLock::new(),
        }
    }

    /// The entry id, i.e. the offset a consumer commits after processing
    pub fn id(&self) -> StreamId {
        self.entry.id
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.entry.field(key)
    }

    pub fn fields(&self) -> &Fields {
        &self.entry.fields
    }

    /// The unparsed `payload` field
    pub fn payload_raw(&self) -> Option<&str> {
        self.entry.payload()
    }

    /// The parsed `payload` field
    pub fn payload(&self) -> Result<&Value> {
        if let Some(value) = self.payload.get() {
            return Ok(value);
        }

        let raw = self
            .payload_raw()
            .ok_or_else(|| serde_json::Error::custom(format!("entry {} has no payload", self.id())))?;
        let value: Value = serde_json::from_str(raw)?;
        Ok(self.payload.get_or_init(|| value))
    }

    /// Deserialize the payload into `T`
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(self.payload()?)?)
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn into_entry(self) -> Entry {
        self.entry
    }
}

impl From<Entry> for Message {
    fn from(entry: Entry) -> Self {
        Self::new(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redstream_core::{payload_fields, RedstreamError};
    use serde::Deserialize;

    fn message(payload: &str) -> Message {
        Message::new(Entry::new(StreamId::new(10, 2), payload_fields(payload)))
    }

    #[test]
    fn test_payload_is_parsed_once() {
        let msg = message(r#"{"id":1}"#);
        let first = msg.payload().unwrap() as *const Value;
        let second = msg.payload().unwrap() as *const Value;
        assert_eq!(first, second);
        assert_eq!(msg.payload().unwrap()["id"], 1);
    }

    #[test]
    fn test_typed_payload() {
        #[derive(Deserialize)]
        struct Product {
            id: u64,
        }

        let msg = message(r#"{"id":7}"#);
        let product: Product = msg.payload_as().unwrap();
        assert_eq!(product.id, 7);
    }

    #[test]
    fn test_field_access() {
        let mut fields = payload_fields("{}");
        fields.insert("source".into(), "import".into());
        let msg = Message::new(Entry::new(StreamId::new(1, 0), fields));

        assert_eq!(msg.id().to_string(), "1-0");
        assert_eq!(msg.field("source"), Some("import"));
        assert_eq!(msg.field("missing"), None);
    }

    #[test]
    fn test_missing_or_invalid_payload() {
        let msg = Message::new(Entry::new(StreamId::new(1, 0), Fields::new()));
        assert!(matches!(msg.payload(), Err(RedstreamError::Serialization(_))));

        let msg = message("not json");
        assert!(msg.payload().is_err());
    }
}
