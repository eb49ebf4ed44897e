//! Output validation for agent actions
//!
//! Surface-level structural checks on tool observations. The validator never
//! re-runs anything; it inspects the observation string and, for file
//! writes, the content that was written.

use std::path::Path;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;

/// Status of a validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
    Invalid,
    Warning,
    Skipped,
}

/// Result of validating one action
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

impl ValidationResult {
    fn valid(message: impl Into<String>) -> Self {
        ValidationResult {
            status: ValidationStatus::Valid,
            message: message.into(),
            details: None,
            suggestions: None,
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        ValidationResult {
            status: ValidationStatus::Invalid,
            message: message.into(),
            details: None,
            suggestions: None,
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        ValidationResult {
            status: ValidationStatus::Warning,
            message: message.into(),
            details: None,
            suggestions: None,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = Some(suggestions);
        self
    }
}

/// Validates observations produced by agent actions.
#[derive(Default)]
pub struct OutputValidator;

impl OutputValidator {
    pub fn new() -> Self {
        OutputValidator
    }

    /// Validate the observation of an action. Unrecognized actions are
    /// skipped rather than failed.
    pub fn validate(&self, action: &str, result: &str, params: &Value) -> ValidationResult {
        match action {
            "write_file" => self.validate_write_file(result, params),
            "execute_command" => self.validate_command(result, params),
            "read_file" => self.validate_read_file(result, params),
            "create_pdf" => self.validate_pdf(result, params),
            "web_search" => self.validate_search(result, params),
            _ => ValidationResult {
                status: ValidationStatus::Skipped,
                message: format!("No validator for action: {}", action),
                details: None,
                suggestions: None,
            },
        }
    }

    fn validate_write_file(&self, result: &str, params: &Value) -> ValidationResult {
        let file_path = params
            .get("file_path")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let content = params
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let lower = result.to_lowercase();
        if lower.contains("error") {
            return ValidationResult::invalid("File write failed")
                .with_details(serde_json::json!({"error": result}));
        }
        if !lower.contains("successfully") {
            return ValidationResult::warning("Unclear if file was written successfully");
        }

        let ext = Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "py" => self.validate_python_surface(content, file_path),
            "json" => self.validate_json_syntax(content, file_path),
            "md" | "txt" => self.validate_text_file(content, file_path),
            _ => ValidationResult::valid("File written successfully").with_details(
                serde_json::json!({"path": file_path, "size": content.len()}),
            ),
        }
    }

    /// Surface-level Python check: balanced brackets and terminated strings,
    /// reporting the line and offset of the first problem.
    fn validate_python_surface(&self, content: &str, file_path: &str) -> ValidationResult {
        match python_surface_error(content) {
            None => ValidationResult::valid("Python syntax is valid")
                .with_details(serde_json::json!({"path": file_path})),
            Some((line, offset, message)) => {
                ValidationResult::invalid(format!("Python syntax error: {}", message))
                    .with_details(serde_json::json!({"line": line, "offset": offset}))
                    .with_suggestions(vec![
                        format!("Check line {} for syntax issues", line),
                        "Ensure proper indentation".to_string(),
                        "Check for missing colons, brackets, or quotes".to_string(),
                    ])
            }
        }
    }

    fn validate_json_syntax(&self, content: &str, file_path: &str) -> ValidationResult {
        match serde_json::from_str::<Value>(content) {
            Ok(_) => ValidationResult::valid("JSON syntax is valid")
                .with_details(serde_json::json!({"path": file_path})),
            Err(e) => ValidationResult::invalid(format!("JSON syntax error: {}", e))
                .with_details(serde_json::json!({"line": e.line(), "column": e.column()}))
                .with_suggestions(vec![
                    "Check for trailing commas".to_string(),
                    "Ensure all strings are double-quoted".to_string(),
                    "Verify bracket matching".to_string(),
                ]),
        }
    }

    fn validate_text_file(&self, content: &str, file_path: &str) -> ValidationResult {
        if content.trim().is_empty() {
            return ValidationResult::warning("File is empty or contains only whitespace")
                .with_details(serde_json::json!({"path": file_path}))
                .with_suggestions(vec!["Consider adding content to the file".to_string()]);
        }
        ValidationResult::valid("Text file is valid").with_details(
            serde_json::json!({"path": file_path, "lines": content.lines().count()}),
        )
    }

    fn validate_command(&self, result: &str, params: &Value) -> ValidationResult {
        let command = params.get("command").and_then(|v| v.as_str()).unwrap_or("");

        static ERROR_PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
        let error_patterns = ERROR_PATTERNS.get_or_init(|| {
            [
                (r"command not found", "Command not found - may need to install"),
                (r"No such file or directory", "File or directory does not exist"),
                (r"Permission denied", "Permission denied - may need different permissions"),
                (r"ModuleNotFoundError", "Python module not installed"),
                (r"Traceback", "Python exception occurred"),
                (r"exit code: [1-9]", "Command exited with non-zero status"),
            ]
            .iter()
            .map(|(p, m)| (Regex::new(&format!("(?i){}", p)).unwrap(), *m))
            .collect()
        });

        for (pattern, message) in error_patterns {
            if pattern.is_match(result) {
                return ValidationResult::invalid(*message).with_details(serde_json::json!({
                    "command": command,
                    "output": truncate(result, 500),
                }));
            }
        }

        static SUCCESS_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
        let success_patterns = SUCCESS_PATTERNS.get_or_init(|| {
            [r"exit code: 0", r"successfully", r"done", r"completed"]
                .iter()
                .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
                .collect()
        });

        for pattern in success_patterns {
            if pattern.is_match(result) {
                return ValidationResult::valid("Command executed successfully")
                    .with_details(serde_json::json!({"command": command}));
            }
        }

        ValidationResult::warning("Command outcome unclear").with_details(serde_json::json!({
            "command": command,
            "output": truncate(result, 200),
        }))
    }

    fn validate_read_file(&self, result: &str, params: &Value) -> ValidationResult {
        let file_path = params
            .get("file_path")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let lower = result.to_lowercase();

        if lower.contains("error") || lower.contains("not found") {
            return ValidationResult::invalid("Failed to read file")
                .with_details(serde_json::json!({"path": file_path, "error": result}));
        }
        if result.trim().is_empty() {
            return ValidationResult::warning("File is empty")
                .with_details(serde_json::json!({"path": file_path}));
        }
        ValidationResult::valid("File read successfully")
            .with_details(serde_json::json!({"path": file_path, "size": result.len()}))
    }

    fn validate_pdf(&self, result: &str, params: &Value) -> ValidationResult {
        let file_path = params
            .get("file_path")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let lower = result.to_lowercase();

        if lower.contains("error") {
            return ValidationResult::invalid("PDF creation failed")
                .with_details(serde_json::json!({"path": file_path, "error": result}));
        }
        if lower.contains("successfully") || lower.contains("created") {
            return ValidationResult::valid("PDF created successfully")
                .with_details(serde_json::json!({"path": file_path}));
        }
        ValidationResult::warning("PDF creation status unclear").with_details(
            serde_json::json!({"path": file_path, "result": truncate(result, 200)}),
        )
    }

    fn validate_search(&self, result: &str, params: &Value) -> ValidationResult {
        let query = params.get("query").and_then(|v| v.as_str()).unwrap_or("");

        if result.to_lowercase().contains("no results") {
            return ValidationResult::warning("No search results found")
                .with_details(serde_json::json!({"query": query}))
                .with_suggestions(vec![
                    "Try different keywords".to_string(),
                    "Use broader search terms".to_string(),
                    "Check spelling".to_string(),
                ]);
        }

        static NUMBERED: OnceLock<Regex> = OnceLock::new();
        let numbered = NUMBERED.get_or_init(|| Regex::new(r"(?m)^\d+\.").unwrap());
        let count = numbered.find_iter(result).count();

        if count == 0 {
            return ValidationResult::warning("Search may have failed")
                .with_details(serde_json::json!({"query": query}));
        }
        ValidationResult::valid(format!("Found {} results", count))
            .with_details(serde_json::json!({"query": query, "count": count}))
    }
}

/// Scan python source for unbalanced brackets or unterminated strings.
/// Returns `(line, offset, message)` of the first problem.
fn python_surface_error(content: &str) -> Option<(usize, usize, String)> {
    let mut stack: Vec<(char, usize, usize)> = Vec::new();

    for (line_idx, line) in content.lines().enumerate() {
        let line_no = line_idx + 1;
        let mut in_string: Option<char> = None;
        let mut escaped = false;
        let mut quote_col = 0;

        for (col, ch) in line.chars().enumerate() {
            if let Some(quote) = in_string {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == quote {
                    in_string = None;
                }
                continue;
            }
            match ch {
                '#' => break,
                '\'' | '"' => {
                    in_string = Some(ch);
                    quote_col = col + 1;
                }
                '(' | '[' | '{' => stack.push((ch, line_no, col + 1)),
                ')' | ']' | '}' => {
                    let expected = match ch {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match stack.pop() {
                        Some((open, ..)) if open == expected => {}
                        _ => {
                            return Some((
                                line_no,
                                col + 1,
                                format!("unmatched '{}'", ch),
                            ))
                        }
                    }
                }
                _ => {}
            }
        }

        // A still-open quote at end of line is unterminated (no triple-quote
        // or continuation awareness; this is a surface check only).
        if in_string.is_some() && !line.trim_end().ends_with('\\') {
            let trimmed = line.trim_start();
            if !trimmed.starts_with("'''") && !trimmed.contains("\"\"\"") {
                return Some((line_no, quote_col, "unterminated string literal".into()));
            }
        }
    }

    stack
        .pop()
        .map(|(open, line, col)| (line, col, format!("'{}' was never closed", open)))
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Aggregates per-action validations into a task-level verdict.
#[derive(Default)]
pub struct TaskValidator {
    actions: Vec<(String, ValidationStatus)>,
}

impl TaskValidator {
    pub fn new() -> Self {
        TaskValidator::default()
    }

    /// Record one validated action
    pub fn record_action(&mut self, action: &str, validation: &ValidationResult) {
        self.actions.push((action.to_string(), validation.status));
    }

    /// Decide whether the task as a whole succeeded.
    pub fn assess_task_completion(&self) -> ValidationResult {
        let successful = self
            .actions
            .iter()
            .filter(|(_, s)| *s == ValidationStatus::Valid)
            .count();
        let failed = self
            .actions
            .iter()
            .filter(|(_, s)| *s == ValidationStatus::Invalid)
            .count();

        let details = serde_json::json!({
            "total_actions": self.actions.len(),
            "successful": successful,
            "failed": failed,
        });

        if failed > successful {
            ValidationResult::invalid("Task likely incomplete due to multiple failures")
                .with_details(details)
                .with_suggestions(vec![
                    "Review failed actions".to_string(),
                    "Try alternative approaches".to_string(),
                ])
        } else if failed > 0 {
            ValidationResult::warning("Task completed with some failures").with_details(details)
        } else {
            ValidationResult::valid("Task appears to be completed successfully")
                .with_details(details)
        }
    }

    /// Reset for a new task
    pub fn reset(&mut self) {
        self.actions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_actions_are_skipped() {
        let validator = OutputValidator::new();
        let result = validator.validate("calculator", "Result: 4", &json!({}));
        assert_eq!(result.status, ValidationStatus::Skipped);
    }

    #[test]
    fn write_file_error_is_invalid() {
        let validator = OutputValidator::new();
        let result = validator.validate(
            "write_file",
            "Error writing file: disk full",
            &json!({"file_path": "a.txt", "content": "x"}),
        );
        assert_eq!(result.status, ValidationStatus::Invalid);
    }

    #[test]
    fn valid_python_write_passes() {
        let validator = OutputValidator::new();
        let result = validator.validate(
            "write_file",
            "File written successfully: hello.py",
            &json!({"file_path": "hello.py", "content": "def main():\n    print('hi')\n"}),
        );
        assert_eq!(result.status, ValidationStatus::Valid);
    }

    #[test]
    fn unbalanced_python_reports_line() {
        let validator = OutputValidator::new();
        let result = validator.validate(
            "write_file",
            "File written successfully: bad.py",
            &json!({"file_path": "bad.py", "content": "x = (1 + 2\nprint(x)\n"}),
        );
        assert_eq!(result.status, ValidationStatus::Invalid);
        let details = result.details.unwrap();
        assert_eq!(details["line"], 1);
    }

    #[test]
    fn unterminated_string_reports_line() {
        assert!(python_surface_error("s = 'oops\n").is_some());
        assert!(python_surface_error("s = 'fine'\n").is_none());
    }

    #[test]
    fn bad_json_reports_line_and_column() {
        let validator = OutputValidator::new();
        let result = validator.validate(
            "write_file",
            "File written successfully: data.json",
            &json!({"file_path": "data.json", "content": "{\"a\": 1,}"}),
        );
        assert_eq!(result.status, ValidationStatus::Invalid);
        assert!(result.details.unwrap().get("line").is_some());
    }

    #[test]
    fn empty_markdown_warns() {
        let validator = OutputValidator::new();
        let result = validator.validate(
            "write_file",
            "File written successfully: notes.md",
            &json!({"file_path": "notes.md", "content": "   \n"}),
        );
        assert_eq!(result.status, ValidationStatus::Warning);
    }

    #[test]
    fn command_exit_codes_drive_status() {
        let validator = OutputValidator::new();
        let params = json!({"command": "python run.py"});

        let ok = validator.validate("execute_command", "Exit code: 0\nOutput:\nhi", &params);
        assert_eq!(ok.status, ValidationStatus::Valid);

        let fail = validator.validate(
            "execute_command",
            "Exit code: 1\nErrors:\nTraceback (most recent call last)",
            &params,
        );
        assert_eq!(fail.status, ValidationStatus::Invalid);

        let unclear = validator.validate("execute_command", "some text", &params);
        assert_eq!(unclear.status, ValidationStatus::Warning);
    }

    #[test]
    fn search_counts_numbered_results() {
        let validator = OutputValidator::new();
        let result = validator.validate(
            "web_search",
            "1. **Rust** https://rust-lang.org\n2. **Tokio** https://tokio.rs\n",
            &json!({"query": "rust"}),
        );
        assert_eq!(result.status, ValidationStatus::Valid);
        assert_eq!(result.details.unwrap()["count"], 2);
    }

    #[test]
    fn task_verdict_aggregation() {
        let mut task = TaskValidator::new();
        let valid = ValidationResult::valid("ok");
        let invalid = ValidationResult::invalid("bad");

        task.record_action("write_file", &valid);
        task.record_action("execute_command", &invalid);
        assert_eq!(
            task.assess_task_completion().status,
            ValidationStatus::Warning
        );

        task.record_action("execute_command", &invalid);
        assert_eq!(
            task.assess_task_completion().status,
            ValidationStatus::Invalid
        );

        task.reset();
        task.record_action("write_file", &valid);
        assert_eq!(task.assess_task_completion().status, ValidationStatus::Valid);
    }
}
