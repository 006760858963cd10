use super::{decode_each, Format, QuestionStore};
use crate::error::StorageError;
use crate::model::QuestionRecord;

/// Block-style YAML sequence with the same fields as the JSON layout.
pub struct YamlStore;

impl QuestionStore for YamlStore {
    fn format(&self) -> Format {
        Format::Yaml
    }

    fn decode(&self, raw: &[u8]) -> Result<Vec<QuestionRecord>, StorageError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        let items: Vec<serde_yaml::Value> = serde_yaml::from_slice(raw)?;
        Ok(decode_each(items, serde_yaml::from_value::<QuestionRecord>))
    }

    fn encode(&self, records: &[&QuestionRecord]) -> Result<Vec<u8>, StorageError> {
        Ok(serde_yaml::to_string(records)?.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sample;

    #[test]
    fn empty_document_is_empty_dataset() {
        assert!(YamlStore.decode(b"").unwrap().is_empty());
        assert!(YamlStore.decode(b"\n  \n").unwrap().is_empty());
    }

    #[test]
    fn block_style() {
        let q = sample("Question 1", &[("A", "x")], &["A"]);
        let body = String::from_utf8(YamlStore.encode(&[&q]).unwrap()).unwrap();
        assert!(body.starts_with("- id: Question 1\n"));
        assert!(body.contains("  options:\n    A: x\n"));
        assert!(!body.contains('{'));
    }
}
