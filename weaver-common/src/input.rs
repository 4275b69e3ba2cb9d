// ABOUTME: checks user-supplied text and schema before anything is sent to the daemon.
// ABOUTME: reports every violated rule at once so a client can show them together.

use serde::{Deserialize, Serialize};

/// Counted in UTF-16 code units, the way a browser form measures length.
pub const MIN_TEXT_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputField {
    Text,
    Schema,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InputIssue {
    pub field: InputField,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InputVerdict {
    pub ok: bool,
    pub issues: Vec<InputIssue>,
}

pub fn check_input(text: &str, schema: &str) -> Result<(), Vec<InputIssue>> {
    let mut issues = Vec::new();

    if text.encode_utf16().count() < MIN_TEXT_CHARS {
        issues.push(InputIssue {
            field: InputField::Text,
            message: format!("Text must be at least {MIN_TEXT_CHARS} characters."),
        });
    }

    if schema.is_empty() {
        issues.push(InputIssue {
            field: InputField::Schema,
            message: "JSON schema is required.".to_string(),
        });
    } else if serde_json::from_str::<serde_json::Value>(schema).is_err() {
        issues.push(InputIssue {
            field: InputField::Schema,
            message: "Invalid JSON schema format.".to_string(),
        });
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

pub fn input_verdict(text: &str, schema: &str) -> InputVerdict {
    match check_input(text, schema) {
        Ok(()) => InputVerdict { ok: true, issues: vec![] },
        Err(issues) => InputVerdict { ok: false, issues },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ten_chars_and_json_schema() {
        assert!(check_input("0123456789", r#"{"a":"string"}"#).is_ok());
    }

    #[test]
    fn rejects_short_text() {
        let issues = check_input("too short", "{}").unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, InputField::Text);
        assert_eq!(issues[0].message, "Text must be at least 10 characters.");
    }

    #[test]
    fn counts_utf16_units_not_bytes() {
        assert!(check_input("ééééé", "{}").is_err());
        assert!(check_input("éééééééééé", "{}").is_ok());
    }

    #[test]
    fn astral_chars_count_as_two_units() {
        assert!(check_input("😀😀😀😀😀", "{}").is_ok());
        assert!(check_input("😀😀😀😀", "{}").is_err());
    }

    #[test]
    fn reports_missing_and_invalid_schema_separately() {
        let missing = check_input("long enough text", "").unwrap_err();
        assert_eq!(missing[0].message, "JSON schema is required.");

        let invalid = check_input("long enough text", "{name: string}").unwrap_err();
        assert_eq!(invalid[0].message, "Invalid JSON schema format.");
    }

    #[test]
    fn reports_all_issues_together() {
        let verdict = input_verdict("short", "nope");
        assert!(!verdict.ok);
        assert_eq!(verdict.issues.len(), 2);
    }
}
