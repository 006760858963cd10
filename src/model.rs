use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// One scraped exam question. Identity is the `id` string as shown by the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: IndexMap<String, String>,
    #[serde(default, deserialize_with = "answer_list")]
    pub correct_answers: Vec<String>,
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Correct answers as stored by older or hand-edited datasets: a list, a
/// single label, or null.
pub(crate) fn answer_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Answers {
        Many(Vec<String>),
        One(String),
    }

    Ok(match Option::<Answers>::deserialize(d)? {
        Some(Answers::Many(labels)) => labels,
        Some(Answers::One(label)) => vec![label],
        None => Vec::new(),
    })
}

/// Master dataset keyed by question id, in insertion order.
pub type QuestionMap = IndexMap<String, QuestionRecord>;

impl QuestionRecord {
    pub fn is_multiple_choice(&self) -> bool {
        self.correct_answers.len() > 1
    }

    pub fn has_answers(&self) -> bool {
        !self.correct_answers.is_empty()
    }

    pub fn number(&self) -> u64 {
        question_number(&self.id)
    }
}

/// Numeric index of a question id: the first run of digits, or 0.
pub fn question_number(id: &str) -> u64 {
    NUMBER_RE
        .find(id)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Merge freshly scraped records into the master map, overwriting by id.
/// Returns how many records were merged.
pub fn merge_records(master: &mut QuestionMap, records: Vec<QuestionRecord>) -> usize {
    let count = records.len();
    for record in records {
        master.insert(record.id.clone(), record);
    }
    count
}

pub fn to_map(records: Vec<QuestionRecord>) -> QuestionMap {
    let mut map = QuestionMap::with_capacity(records.len());
    merge_records(&mut map, records);
    map
}

#[cfg(test)]
pub(crate) fn sample(id: &str, options: &[(&str, &str)], correct: &[&str]) -> QuestionRecord {
    QuestionRecord {
        id: id.to_string(),
        text: format!("Prompt for {}", id),
        options: options
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        correct_answers: correct.iter().map(|c| c.to_string()).collect(),
    }
}
