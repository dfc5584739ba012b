//! Wire-level helpers for the hosted backend (PostgREST tables, storage
//! buckets, edge functions). The HTTP client itself lives in the CLI.

use anyhow::{Result, bail};
use serde::Deserialize;

/// Error body shapes returned by the REST, storage and function gateways.
/// Every field is optional because each service fills a different subset.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    pub message: Option<String>,
    pub error: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
    pub code: Option<String>,
}

#[must_use]
pub fn rest_path(table: &str) -> String {
    format!("/rest/v1/{table}")
}

#[must_use]
pub fn function_path(name: &str) -> String {
    format!("/functions/v1/{name}")
}

/// Storage URL path for an object, each segment percent-encoded.
#[must_use]
pub fn object_path(bucket: &str, path: &str) -> String {
    let encoded: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::encode(s).into_owned())
        .collect();
    format!(
        "/storage/v1/object/{}/{}",
        urlencoding::encode(bucket),
        encoded.join("/")
    )
}

#[must_use]
pub fn eq_filter(value: &str) -> String {
    format!("eq.{value}")
}

/// `ilike` filter matching `name` exactly, with LIKE wildcards escaped.
#[must_use]
pub fn ilike_exact(name: &str) -> String {
    let escaped = name
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("ilike.{escaped}")
}

/// Case-insensitive name equality, used to confirm `ilike` hits.
#[must_use]
pub fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Human-readable message for a failed response.
#[must_use]
pub fn describe_error(status: u16, body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let mut message = parsed
        .message
        .or(parsed.error)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                format!("HTTP {status}")
            } else {
                trimmed.chars().take(200).collect()
            }
        });
    if let Some(details) = parsed.details.filter(|d| !d.is_empty()) {
        message = format!("{message} ({details})");
    }
    if let Some(hint) = parsed.hint.filter(|h| !h.is_empty()) {
        message = format!("{message}. Hint: {hint}");
    }
    message
}

/// PostgREST answers writes with `return=representation` as an array; take
/// its single row.
pub fn single_row<T>(rows: Vec<T>, what: &str) -> Result<T> {
    let mut rows = rows.into_iter();
    match (rows.next(), rows.next()) {
        (Some(row), None) => Ok(row),
        (None, _) => bail!("No {what} row returned"),
        (Some(_), Some(_)) => bail!("Expected one {what} row, got several"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(rest_path("ingredients"), "/rest/v1/ingredients");
        assert_eq!(
            function_path("generate-recipe"),
            "/functions/v1/generate-recipe"
        );
        assert_eq!(
            object_path("recipes", "abc123.pdf"),
            "/storage/v1/object/recipes/abc123.pdf"
        );
        assert_eq!(
            object_path("recipes", "my dir/a b.txt"),
            "/storage/v1/object/recipes/my%20dir/a%20b.txt"
        );
    }

    #[test]
    fn test_filters() {
        assert_eq!(eq_filter("42"), "eq.42");
        assert_eq!(ilike_exact("Flour"), "ilike.Flour");
        assert_eq!(ilike_exact("100%_rye"), "ilike.100\\%\\_rye");
    }

    #[test]
    fn test_same_name() {
        assert!(same_name("Flour", " flour "));
        assert!(same_name("CRÈME", "crème"));
        assert!(!same_name("Flour", "Flours"));
    }

    #[test]
    fn test_describe_postgrest_error() {
        let body = r#"{"code":"23502","details":"Failing row contains (null).","hint":null,"message":"null value in column \"name\""}"#;
        assert_eq!(
            describe_error(400, body),
            "null value in column \"name\" (Failing row contains (null).)"
        );
    }

    #[test]
    fn test_describe_function_and_plain_errors() {
        assert_eq!(
            describe_error(500, r#"{"error":"model overloaded"}"#),
            "model overloaded"
        );
        assert_eq!(describe_error(502, "Bad Gateway"), "Bad Gateway");
        assert_eq!(describe_error(503, "  "), "HTTP 503");
    }

    #[test]
    fn test_single_row() {
        assert_eq!(single_row(vec![1], "ingredient").unwrap(), 1);
        assert!(single_row(Vec::<i32>::new(), "ingredient").is_err());
        assert!(single_row(vec![1, 2], "ingredient").is_err());
    }
}
