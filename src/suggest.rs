//! Question suggestions
//!
//! Shows the model a one-line-per-table digest of the schema and asks for
//! three example questions as a JSON array. Anything the model gets wrong
//! (no reply, prose, malformed JSON) yields [`FALLBACK_QUESTIONS`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::oracle::Oracle;
use crate::reader::Reader;
use crate::{AskdbError, Result, Soft};

/// Questions returned when the model's answer cannot be used
pub const FALLBACK_QUESTIONS: [&str; 3] = [
    "Show me the first 5 rows of data",
    "Count the total number of records",
    "List all tables in the database",
];

pub fn fallback_questions() -> Vec<String> {
    FALLBACK_QUESTIONS.iter().map(|q| q.to_string()).collect()
}

pub struct QuestionSuggester {
    oracle: Arc<dyn Oracle>,
}

impl QuestionSuggester {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Suggest questions about the reader's data
    ///
    /// # Errors
    ///
    /// Only schema introspection failures are errors. Oracle failures and
    /// unparseable replies fall back to [`FALLBACK_QUESTIONS`].
    pub async fn suggest(&self, reader: &dyn Reader) -> Result<Vec<String>> {
        let digest = schema_digest(reader).await?;
        let prompt = build_prompt(&digest);
        debug!("Suggestion prompt:\n{}", prompt);

        let questions = match self.oracle.complete(&prompt).await {
            Ok(reply) => parse_questions(&reply),
            Err(e) => Soft::Fallback {
                value: fallback_questions(),
                reason: e.to_string(),
            },
        };

        match &questions {
            Soft::Ok(q) => info!("{} suggested {} questions", self.oracle.name(), q.len()),
            Soft::Fallback { reason, .. } => warn!("Using fallback questions: {}", reason),
        }
        Ok(questions.into_inner())
    }
}

/// One `Table: X, Columns: a, b, c` line per table
pub async fn schema_digest(reader: &dyn Reader) -> Result<String> {
    let mut lines = Vec::new();
    for table in reader.table_names().await? {
        let columns: Vec<String> = reader
            .columns(&table)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        lines.push(format!("Table: {}, Columns: {}", table, columns.join(", ")));
    }
    Ok(lines.join("\n"))
}

pub fn build_prompt(digest: &str) -> String {
    format!(
        "Analyze the following database schema:\n\
         {}\n\n\
         Generate 3 diverse, interesting, and valid natural language questions a user might ask about this data.\n\
         Return ONLY a JSON list of strings, e.g., [\"Question 1?\", \"Question 2?\", \"Question 3?\"].\n\
         Do not output any markdown formatting or explanations.",
        digest
    )
}

/// Body of the first ```` ```json ```` block, else of the first ```` ``` ```` block, else the text
fn unfence(content: &str) -> &str {
    let inner = if let Some((_, rest)) = content.split_once("```json") {
        rest
    } else if let Some((_, rest)) = content.split_once("```") {
        rest
    } else {
        return content;
    };
    inner.split("```").next().unwrap_or(inner).trim()
}

/// Parse the model's reply as a JSON array of strings
pub fn parse_questions(raw: &str) -> Soft<Vec<String>> {
    let content = unfence(raw.trim());
    let parsed = serde_json::from_str::<Vec<String>>(content).map_err(|e| {
        AskdbError::OracleError(format!("Reply is not a JSON list of strings ({}): {}", e, content))
    });
    Soft::from_result(parsed, fallback_questions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::ScriptedOracle;
    use crate::reader::csv::CsvSource;
    use crate::reader::{SqliteReader, CSV_TABLE};

    fn csv_reader() -> SqliteReader {
        let reader = SqliteReader::in_memory().unwrap();
        let df = CsvSource::Inline("region,amount\nnorth,10\nsouth,20".to_string())
            .read()
            .unwrap();
        reader.register(CSV_TABLE, df).unwrap();
        reader
    }

    #[test]
    fn test_parse_plain_array() {
        let soft = parse_questions(r#"["A?", "B?", "C?"]"#);
        assert_eq!(soft, Soft::Ok(vec!["A?".to_string(), "B?".to_string(), "C?".to_string()]));
    }

    #[test]
    fn test_parse_json_fence() {
        let raw = "Here you go:\n```json\n[\"Total sales?\", \"Top region?\", \"Average amount?\"]\n```\nEnjoy";
        let soft = parse_questions(raw);
        assert!(!soft.is_fallback());
        assert_eq!(soft.into_inner()[1], "Top region?");
    }

    #[test]
    fn test_parse_untagged_fence() {
        let soft = parse_questions("```\n[\"One?\"]\n```");
        assert_eq!(soft.into_inner(), vec!["One?"]);
    }

    #[test]
    fn test_invalid_json_falls_back() {
        for raw in ["I cannot help with that", "```json\n{\"q\": 1}\n```", "[1, 2, 3]", ""] {
            let soft = parse_questions(raw);
            assert!(soft.is_fallback(), "expected fallback for {:?}", raw);
            assert_eq!(soft.into_inner(), fallback_questions());
        }
    }

    #[tokio::test]
    async fn test_digest_lists_columns() {
        let digest = schema_digest(&csv_reader()).await.unwrap();
        assert_eq!(digest, "Table: data, Columns: region, amount");
    }

    #[tokio::test]
    async fn test_suggest_sends_digest_and_parses_reply() {
        let oracle = Arc::new(ScriptedOracle::replying("```json\n[\"Which region sold most?\"]\n```"));
        let suggester = QuestionSuggester::new(oracle.clone());

        let questions = suggester.suggest(&csv_reader()).await.unwrap();
        assert_eq!(questions, vec!["Which region sold most?"]);
        assert!(oracle.last_prompt().contains("Table: data, Columns: region, amount"));
        assert!(oracle.last_prompt().contains("Return ONLY a JSON list of strings"));
    }

    #[tokio::test]
    async fn test_oracle_failure_falls_back() {
        let suggester = QuestionSuggester::new(Arc::new(ScriptedOracle::failing("quota exceeded")));
        let questions = suggester.suggest(&csv_reader()).await.unwrap();
        assert_eq!(questions, fallback_questions());
    }
}
