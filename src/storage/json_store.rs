use serde::Serialize;

use super::{decode_each, Format, QuestionStore};
use crate::error::StorageError;
use crate::model::QuestionRecord;

/// Pretty-printed JSON array, four-space indent.
pub struct JsonStore;

impl QuestionStore for JsonStore {
    fn format(&self) -> Format {
        Format::Json
    }

    fn decode(&self, raw: &[u8]) -> Result<Vec<QuestionRecord>, StorageError> {
        let items: Vec<serde_json::Value> = serde_json::from_slice(raw)?;
        Ok(decode_each(items, serde_json::from_value::<QuestionRecord>))
    }

    fn encode(&self, records: &[&QuestionRecord]) -> Result<Vec<u8>, StorageError> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        records.serialize(&mut ser)?;
        out.push(b'\n');
        Ok(out)
    }
}
