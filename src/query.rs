//! Question-to-SQL pipeline
//!
//! Builds a prompt from the schema (declared column types plus a few sample
//! rows per table), asks the oracle for a statement, cleans the reply with
//! [`clean_sql`], executes it and converts the rows to JSON records.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::config::QueryOptions;
use crate::extract::clean_sql;
use crate::oracle::Oracle;
use crate::reader::{Dialect, Reader};
use crate::{AskdbError, Result, Rows, Soft};

/// Statement keywords accepted when `read_only` is set
const READ_ONLY_KEYWORDS: &[&str] = &["SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN"];

/// Response of `/query`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub question: String,
    pub sql: String,
    pub data: Vec<Map<String, JsonValue>>,
}

pub struct QueryPipeline {
    oracle: Arc<dyn Oracle>,
    options: QueryOptions,
}

impl QueryPipeline {
    pub fn new(oracle: Arc<dyn Oracle>, options: QueryOptions) -> Self {
        Self { oracle, options }
    }

    /// Answer a question against the reader's data
    ///
    /// `history` holds earlier conversation lines (`User: ...`, `AI: ...`),
    /// oldest first; it may be empty.
    ///
    /// # Errors
    ///
    /// - `IntrospectionError` if the schema cannot be read
    /// - `OracleError` if the oracle fails or returns no SQL
    /// - `ExecutionError` if the statement fails or is refused in read-only mode
    pub async fn answer(&self, question: &str, history: &[String], reader: &dyn Reader) -> Result<QueryResult> {
        let table_info = self.table_info(reader).await?;
        let prompt = build_prompt(reader.dialect(), self.options.top_k, &table_info, history, question);
        debug!("Query prompt:\n{}", prompt);

        let reply = self.oracle.complete(&prompt).await?;
        let sql = clean_sql(&reply);
        if sql.is_empty() {
            return Err(AskdbError::OracleError(format!(
                "{} did not return a SQL query",
                self.oracle.name()
            )));
        }

        if self.options.read_only && !is_read_only(&sql) {
            return Err(AskdbError::ExecutionError(format!(
                "Refusing to run a statement that is not read-only: {}",
                sql
            )));
        }

        info!("Executing generated SQL");
        debug!("SQL: {}", sql);
        let rows = if self.options.read_only {
            reader.execute_read_only(&sql).await?
        } else {
            reader.execute_sql(&sql).await?
        };

        let mut data = rows.to_records();
        if self.options.max_rows > 0 && data.len() > self.options.max_rows {
            info!("Truncating {} result rows to {}", data.len(), self.options.max_rows);
            data.truncate(self.options.max_rows);
        }

        Ok(QueryResult {
            question: question.to_string(),
            sql,
            data,
        })
    }

    /// `CREATE TABLE`-style description of every table, each followed by sample rows
    pub async fn table_info(&self, reader: &dyn Reader) -> Result<String> {
        let dialect = reader.dialect();
        let mut sections = Vec::new();

        for table in reader.table_names().await? {
            let columns = reader.columns(&table).await?;
            let definitions: Vec<String> = columns
                .iter()
                .map(|c| format!("\t{} {}", dialect.quote_ident(&c.name), c.data_type))
                .collect();
            let mut section = format!(
                "CREATE TABLE {} (\n{}\n)",
                dialect.quote_ident(&table),
                definitions.join(",\n")
            );

            if self.options.sample_rows > 0 {
                let sample = sample_rows(reader, &table, self.options.sample_rows).await;
                if let Soft::Ok(rows) = sample {
                    section.push_str(&format!(
                        "\n\n/*\n{} rows from {} table:\n{}\n*/",
                        rows.len(),
                        table,
                        rows.to_tsv()
                    ));
                }
            }
            sections.push(section);
        }

        Ok(sections.join("\n\n"))
    }
}

/// Sample rows for the prompt; a failure only leaves them out
async fn sample_rows(reader: &dyn Reader, table: &str, limit: usize) -> Soft<Rows> {
    let sample = Soft::from_result(reader.sample_rows(table, limit).await, Rows::empty);
    if let Some(reason) = sample.reason() {
        warn!("No sample rows for table '{}': {}", table, reason);
    }
    sample
}

pub fn build_prompt(
    dialect: Dialect,
    top_k: usize,
    table_info: &str,
    history: &[String],
    question: &str,
) -> String {
    let quoting = dialect.identifier_quoting();
    let dialect = dialect.name();
    let mut prompt = format!(
        "You are a {dialect} expert. Given an input question, first create a syntactically correct \
         {dialect} query to run, then look at the results of the query and return the answer to the input question.\n\
         Unless the user specifies in the question a specific number of examples to obtain, query for at most \
         {top_k} results using the LIMIT clause as per {dialect}. You can order the results to return the most \
         informative data in the database.\n\
         Never query for all columns from a table. You must query only the columns that are needed to answer \
         the question. {quoting}\n\
         Pay attention to use only the column names you can see in the tables below. Be careful to not query \
         for columns that do not exist. Also, pay attention to which column is in which table.\n\n\
         Use the following format:\n\n\
         Question: Question here\n\
         SQLQuery: SQL Query to run\n\
         SQLResult: Result of the SQLQuery\n\
         Answer: Final answer here\n\n\
         Only use the following tables:\n\
         {table_info}\n\n"
    );

    if !history.is_empty() {
        prompt.push_str("Previous conversation:\n");
        for line in history {
            prompt.push_str(line);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Question: {}\nSQLQuery:", question));
    prompt
}

/// Whether a statement starts with a read-only keyword
pub fn is_read_only(sql: &str) -> bool {
    let keyword: String = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    READ_ONLY_KEYWORDS
        .iter()
        .any(|k| k.eq_ignore_ascii_case(&keyword))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::ScriptedOracle;
    use crate::reader::csv::CsvSource;
    use crate::reader::{SqliteReader, CSV_TABLE};
    use serde_json::json;

    fn csv_reader(content: &str) -> SqliteReader {
        let reader = SqliteReader::in_memory().unwrap();
        let df = CsvSource::Inline(content.to_string()).read().unwrap();
        reader.register(CSV_TABLE, df).unwrap();
        reader
    }

    fn pipeline(oracle: &Arc<ScriptedOracle>, options: QueryOptions) -> QueryPipeline {
        QueryPipeline::new(oracle.clone(), options)
    }

    #[tokio::test]
    async fn test_count_question_end_to_end() {
        let oracle = Arc::new(ScriptedOracle::replying("SQLQuery: SELECT COUNT(*) AS count FROM data"));
        let reader = csv_reader("a,b\n1,2\n3,4");

        let result = pipeline(&oracle, QueryOptions::default())
            .answer("How many rows?", &[], &reader)
            .await
            .unwrap();

        assert_eq!(result.question, "How many rows?");
        assert_eq!(result.sql, "SELECT COUNT(*) AS count FROM data");
        assert_eq!(serde_json::to_value(&result.data).unwrap(), json!([{"count": 2}]));
    }

    #[tokio::test]
    async fn test_prompt_carries_schema_samples_and_history() {
        let oracle = Arc::new(ScriptedOracle::replying("SELECT 1"));
        let reader = csv_reader("city,population\nOslo,700000\nBergen,290000");
        let history = vec!["User: Which cities are there?".to_string(), "AI: Oslo and Bergen".to_string()];

        pipeline(&oracle, QueryOptions::default())
            .answer("Which is bigger?", &history, &reader)
            .await
            .unwrap();

        let prompt = oracle.last_prompt();
        assert!(prompt.starts_with("You are a SQLite expert."));
        assert!(prompt.contains("query for at most 1000 results"));
        assert!(prompt.contains("CREATE TABLE \"data\" (\n\t\"city\" TEXT,\n\t\"population\" BIGINT\n)"));
        assert!(prompt.contains("2 rows from data table:\ncity\tpopulation\nOslo\t700000"));
        assert!(prompt.contains("Previous conversation:\nUser: Which cities are there?\nAI: Oslo and Bergen\n"));
        assert!(prompt.ends_with("Question: Which is bigger?\nSQLQuery:"));
    }

    #[tokio::test]
    async fn test_without_history_or_samples() {
        let oracle = Arc::new(ScriptedOracle::replying("SELECT 1"));
        let reader = csv_reader("a\n1");
        let options = QueryOptions {
            sample_rows: 0,
            ..QueryOptions::default()
        };

        pipeline(&oracle, options).answer("q", &[], &reader).await.unwrap();

        let prompt = oracle.last_prompt();
        assert!(!prompt.contains("Previous conversation"));
        assert!(!prompt.contains("rows from data table"));
    }

    #[tokio::test]
    async fn test_fenced_reply_with_result_section() {
        let oracle = Arc::new(ScriptedOracle::replying(
            "SQLQuery: ```sql\nSELECT \"a\" FROM data ORDER BY \"a\" DESC LIMIT 1\n```\nSQLResult: [(3,)]\nAnswer: 3",
        ));
        let reader = csv_reader("a\n1\n3\n2");

        let result = pipeline(&oracle, QueryOptions::default())
            .answer("Largest a?", &[], &reader)
            .await
            .unwrap();

        assert_eq!(result.sql, "SELECT \"a\" FROM data ORDER BY \"a\" DESC LIMIT 1");
        assert_eq!(serde_json::to_value(&result.data).unwrap(), json!([{"a": 3}]));
    }

    #[tokio::test]
    async fn test_empty_reply_is_oracle_error() {
        let oracle = Arc::new(ScriptedOracle::replying("```sql\n```"));
        let err = pipeline(&oracle, QueryOptions::default())
            .answer("q", &[], &csv_reader("a\n1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AskdbError::OracleError(_)));
    }

    #[tokio::test]
    async fn test_oracle_failure_propagates() {
        let oracle = Arc::new(ScriptedOracle::failing("unavailable"));
        let err = pipeline(&oracle, QueryOptions::default())
            .answer("q", &[], &csv_reader("a\n1"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Oracle error: unavailable");
    }

    #[tokio::test]
    async fn test_execution_error_propagates() {
        let oracle = Arc::new(ScriptedOracle::replying("SELECT missing FROM nowhere"));
        let err = pipeline(&oracle, QueryOptions::default())
            .answer("q", &[], &csv_reader("a\n1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AskdbError::ExecutionError(_)));
    }

    #[tokio::test]
    async fn test_statement_without_rows_yields_empty_data() {
        let oracle = Arc::new(ScriptedOracle::replying("DELETE FROM data"));
        let result = pipeline(&oracle, QueryOptions::default())
            .answer("Remove everything", &[], &csv_reader("a\n1"))
            .await
            .unwrap();
        assert!(result.data.is_empty());
    }

    #[tokio::test]
    async fn test_read_only_refuses_writes() {
        let oracle = Arc::new(ScriptedOracle::replying("DROP TABLE data"));
        let reader = csv_reader("a\n1");
        let options = QueryOptions {
            read_only: true,
            ..QueryOptions::default()
        };

        let err = pipeline(&oracle, options).answer("q", &[], &reader).await.unwrap_err();
        assert!(matches!(err, AskdbError::ExecutionError(_)));
        assert_eq!(reader.table_names().await.unwrap(), vec!["data"]);
    }

    #[tokio::test]
    async fn test_read_only_refuses_delete_behind_cte() {
        let oracle = Arc::new(ScriptedOracle::replying("WITH t AS (SELECT 1) DELETE FROM data"));
        let reader = csv_reader("a\n1\n2");
        let options = QueryOptions {
            read_only: true,
            ..QueryOptions::default()
        };

        let err = pipeline(&oracle, options).answer("q", &[], &reader).await.unwrap_err();
        assert!(matches!(err, AskdbError::ExecutionError(_)));

        let count = reader.execute_sql("SELECT COUNT(*) AS n FROM data").await.unwrap();
        assert_eq!(serde_json::to_value(count.to_records()).unwrap(), json!([{"n": 2}]));
    }

    #[tokio::test]
    async fn test_read_only_still_answers_queries() {
        let oracle = Arc::new(ScriptedOracle::replying("SELECT COUNT(*) AS count FROM data"));
        let options = QueryOptions {
            read_only: true,
            ..QueryOptions::default()
        };
        let result = pipeline(&oracle, options)
            .answer("How many?", &[], &csv_reader("a\n1\n2"))
            .await
            .unwrap();
        assert_eq!(serde_json::to_value(&result.data).unwrap(), json!([{"count": 2}]));
    }

    #[test]
    fn test_prompt_quoting_follows_dialect() {
        let mysql = build_prompt(Dialect::MySql, 5, "CREATE TABLE `t` (\n\t`a` INT\n)", &[], "q");
        assert!(mysql.starts_with("You are a MySQL expert."));
        assert!(mysql.contains("Wrap each column name in backticks (`)"));
        assert!(!mysql.contains("double quotes"));

        let sqlite = build_prompt(Dialect::Sqlite, 5, "", &[], "q");
        assert!(sqlite.contains("Wrap each column name in double quotes (\")"));
        assert!(!sqlite.contains("backticks"));
    }

    #[tokio::test]
    async fn test_max_rows_truncates_data() {
        let oracle = Arc::new(ScriptedOracle::replying("SELECT a FROM data"));
        let options = QueryOptions {
            max_rows: 2,
            ..QueryOptions::default()
        };
        let result = pipeline(&oracle, options)
            .answer("q", &[], &csv_reader("a\n1\n2\n3\n4"))
            .await
            .unwrap();
        assert_eq!(result.data.len(), 2);
    }

    #[test]
    fn test_is_read_only() {
        assert!(is_read_only("SELECT 1"));
        assert!(is_read_only("  with t AS (SELECT 1) SELECT * FROM t"));
        assert!(is_read_only("(SELECT 1) UNION (SELECT 2)"));
        assert!(!is_read_only("PRAGMA writable_schema=ON"));
        assert!(!is_read_only("DELETE FROM data"));
        assert!(!is_read_only("SELECTED"));
        assert!(!is_read_only(""));
    }
}
