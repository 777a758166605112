//! SQL extraction from free-form model output
//!
//! Models are prompted to answer in a `SQLQuery: ... SQLResult: ...` layout
//! but frequently wrap the statement in markdown fences or skip the labels.
//! [`clean_sql`] recovers the statement on a best-effort basis:
//!
//! 1. If a `SQLQuery:` label is present, keep only the text after the first
//!    one (up to a second `SQLQuery:` label, if any).
//! 2. Drop everything from a `SQLResult:` label on.
//! 3. Remove ```` ```sql ```` and ```` ``` ```` fence markers.
//! 4. Trim surrounding whitespace.

use std::sync::LazyLock;

use regex::Regex;

const QUERY_LABEL: &str = "SQLQuery:";
const RESULT_LABEL: &str = "SQLResult:";

/// Opening or closing markdown fence, optionally tagged `sql`
static FENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)```(?:sql)?").unwrap());

/// Extract the SQL statement from raw model output
pub fn clean_sql(raw: &str) -> String {
    let labelled = match raw.split_once(QUERY_LABEL) {
        Some((_, rest)) => rest.split(QUERY_LABEL).next().unwrap_or(rest),
        None => raw,
    };

    let statement = match labelled.split_once(RESULT_LABEL) {
        Some((before, _)) => before,
        None => labelled,
    };

    FENCE_PATTERN.replace_all(statement, "").trim().to_string()
}
