use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{decode_each, Format, QuestionStore};
use crate::error::StorageError;
use crate::model::{answer_list, QuestionRecord};

/// Flat CSV row; `options` and `correct_answers` travel as embedded JSON.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    options: String,
    #[serde(default)]
    correct_answers: String,
}

pub struct CsvStore;

impl QuestionStore for CsvStore {
    fn format(&self) -> Format {
        Format::Csv
    }

    fn decode(&self, raw: &[u8]) -> Result<Vec<QuestionRecord>, StorageError> {
        let mut reader = csv::Reader::from_reader(raw);
        Ok(decode_each(reader.deserialize::<CsvRow>(), |row: csv::Result<CsvRow>| {
            let row = row?;
            Ok::<_, StorageError>(QuestionRecord {
                id: row.id,
                text: row.text,
                options: embedded::<IndexMap<String, String>>(&row.options)?,
                correct_answers: embedded_answers(&row.correct_answers)?,
            })
        }))
    }

    fn encode(&self, records: &[&QuestionRecord]) -> Result<Vec<u8>, StorageError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for q in records {
            writer.serialize(CsvRow {
                id: q.id.clone(),
                text: q.text.clone(),
                options: serde_json::to_string(&q.options)?,
                correct_answers: serde_json::to_string(&q.correct_answers)?,
            })?;
        }
        writer
            .into_inner()
            .map_err(|e| StorageError::Csv(e.into_error().into()))
    }
}

fn embedded<T: for<'de> Deserialize<'de> + Default>(cell: &str) -> Result<T, StorageError> {
    if cell.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str::<Option<T>>(cell)?.unwrap_or_default())
}

fn embedded_answers(cell: &str) -> Result<Vec<String>, StorageError> {
    if cell.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut de = serde_json::Deserializer::from_str(cell);
    let answers = answer_list(&mut de)?;
    de.end()?;
    Ok(answers)
}
