//! Self-healing and error recovery strategies
//!
//! Classifies failing observations into known error kinds, proposes ranked
//! corrective actions, and enforces a per-error retry budget. The budget is
//! keyed by a normalized error hash so that retries of the same underlying
//! failure (different paths, line numbers, addresses) share one budget.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Kinds of errors the recovery engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PipInstall,
    ModuleNotFound,
    FileNotFound,
    PermissionDenied,
    CommandNotFound,
    SyntaxError,
    Timeout,
    NetworkError,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PipInstall => "pip_install",
            ErrorKind::ModuleNotFound => "module_not_found",
            ErrorKind::FileNotFound => "file_not_found",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::CommandNotFound => "command_not_found",
            ErrorKind::SyntaxError => "syntax_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::Unknown => "unknown",
        }
    }
}

/// How a recovery action is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryActionType {
    /// Run a shell command through the registered execute_command tool
    ExecuteCommand,
    /// Advisory only; nothing is executed
    NotifyUser,
    /// Wait briefly, then retry the original action
    RetryWithDelay,
    /// Retry the original action with a longer timeout
    RetryWithTimeout,
}

/// A candidate corrective action
#[derive(Debug, Clone)]
pub struct RecoveryAction {
    pub description: String,
    pub action_type: RecoveryActionType,
    pub params: Value,
    pub priority: u32,
}

/// Ordered `(kind, patterns)` table. Order matters: earlier kinds win when
/// an error message matches several.
fn pattern_table() -> &'static [(ErrorKind, Vec<Regex>)] {
    static TABLE: OnceLock<Vec<(ErrorKind, Vec<Regex>)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let compile = |patterns: &[&str]| {
            patterns
                .iter()
                .map(|p| Regex::new(&format!("(?i){}", p)).expect("invalid error pattern"))
                .collect::<Vec<_>>()
        };
        vec![
            (
                ErrorKind::PipInstall,
                compile(&[
                    r"Could not find a version",
                    r"No matching distribution",
                    r"ERROR: Could not install packages",
                ]),
            ),
            (
                ErrorKind::ModuleNotFound,
                compile(&[
                    r"ModuleNotFoundError: No module named '([^']+)'",
                    r"ImportError: No module named '([^']+)'",
                    r"No module named (\w+)",
                ]),
            ),
            (
                ErrorKind::FileNotFound,
                compile(&[
                    r"FileNotFoundError",
                    r"No such file or directory",
                    r"File not found",
                    r"\[Errno 2\]",
                ]),
            ),
            (
                ErrorKind::PermissionDenied,
                compile(&[r"PermissionError", r"Permission denied", r"\[Errno 13\]"]),
            ),
            (
                ErrorKind::CommandNotFound,
                compile(&[
                    r"command not found",
                    r"bash: (\w+): not found",
                    r"No such command",
                ]),
            ),
            (
                ErrorKind::SyntaxError,
                compile(&[r"SyntaxError", r"IndentationError", r"invalid syntax"]),
            ),
            (
                ErrorKind::Timeout,
                compile(&[r"TimeoutError", r"timed out", r"timeout"]),
            ),
            (
                ErrorKind::NetworkError,
                compile(&[
                    r"ConnectionError",
                    r"ConnectionRefused",
                    r"Network is unreachable",
                    r"Name or service not known",
                ]),
            ),
        ]
    })
}

/// Classify an error message. Returns the kind and the first capture group
/// (module name, command name, ...) when the matching pattern has one.
pub fn detect_error_kind(error_message: &str) -> (ErrorKind, Option<String>) {
    for (kind, patterns) in pattern_table() {
        for pattern in patterns {
            if let Some(captures) = pattern.captures(error_message) {
                let extracted = captures.get(1).map(|m| m.as_str().to_string());
                return (*kind, extracted);
            }
        }
    }
    (ErrorKind::Unknown, None)
}

/// Map python import names to pip package names where they differ.
fn pip_package_name(module: &str) -> &str {
    match module {
        "cv2" => "opencv-python",
        "PIL" => "Pillow",
        "sklearn" => "scikit-learn",
        "yaml" => "PyYAML",
        "bs4" => "beautifulsoup4",
        other => other,
    }
}

/// Map missing commands to apt package names where they differ.
fn apt_package_name(command: &str) -> &str {
    match command {
        "convert" => "imagemagick",
        other => other,
    }
}

/// Build the ordered candidate list for an error kind.
pub fn recovery_strategies(
    kind: ErrorKind,
    extracted: Option<&str>,
    original_params: Option<&Value>,
) -> Vec<RecoveryAction> {
    match kind {
        ErrorKind::ModuleNotFound => {
            let module = extracted.unwrap_or("unknown");
            let package = pip_package_name(module);
            vec![
                RecoveryAction {
                    description: format!("Install {} with pip", package),
                    action_type: RecoveryActionType::ExecuteCommand,
                    params: serde_json::json!({"command": format!("pip install {}", package)}),
                    priority: 1,
                },
                RecoveryAction {
                    description: format!("Install {} with pip3", package),
                    action_type: RecoveryActionType::ExecuteCommand,
                    params: serde_json::json!({"command": format!("pip3 install {}", package)}),
                    priority: 2,
                },
                RecoveryAction {
                    description: format!("Install {} with python -m pip", package),
                    action_type: RecoveryActionType::ExecuteCommand,
                    params: serde_json::json!({"command": format!("python -m pip install {}", package)}),
                    priority: 3,
                },
            ]
        }
        ErrorKind::PipInstall => {
            let command = original_params
                .and_then(|p| p.get("command"))
                .and_then(|c| c.as_str())
                .unwrap_or("");
            static PIP_PACKAGE: OnceLock<Regex> = OnceLock::new();
            let re = PIP_PACKAGE
                .get_or_init(|| Regex::new(r"pip\d?\s+install\s+(\S+)").unwrap());
            match re.captures(command).and_then(|c| c.get(1)) {
                Some(package) => {
                    let package = package.as_str();
                    vec![
                        RecoveryAction {
                            description: format!("Retry pip install {} with --user", package),
                            action_type: RecoveryActionType::ExecuteCommand,
                            params: serde_json::json!({"command": format!("pip install --user {}", package)}),
                            priority: 1,
                        },
                        RecoveryAction {
                            description: format!(
                                "Retry pip install {} with --break-system-packages",
                                package
                            ),
                            action_type: RecoveryActionType::ExecuteCommand,
                            params: serde_json::json!({"command": format!("pip install {} --break-system-packages", package)}),
                            priority: 2,
                        },
                        RecoveryAction {
                            description: "Upgrade pip and retry".to_string(),
                            action_type: RecoveryActionType::ExecuteCommand,
                            params: serde_json::json!({"command": format!("pip install --upgrade pip && pip install {}", package)}),
                            priority: 3,
                        },
                    ]
                }
                None => vec![],
            }
        }
        ErrorKind::FileNotFound => {
            let file_path = original_params
                .and_then(|p| p.get("file_path"))
                .and_then(|f| f.as_str())
                .or(extracted);
            match file_path.and_then(|p| {
                std::path::Path::new(p)
                    .parent()
                    .filter(|parent| !parent.as_os_str().is_empty())
            }) {
                Some(parent) => vec![RecoveryAction {
                    description: format!("Create parent directory {}", parent.display()),
                    action_type: RecoveryActionType::ExecuteCommand,
                    params: serde_json::json!({"command": format!("mkdir -p {}", parent.display())}),
                    priority: 1,
                }],
                None => vec![],
            }
        }
        ErrorKind::CommandNotFound => {
            let command = extracted.unwrap_or("");
            if command.is_empty() {
                return vec![];
            }
            let package = apt_package_name(command);
            vec![RecoveryAction {
                description: format!("Install {} via apt-get", package),
                action_type: RecoveryActionType::ExecuteCommand,
                params: serde_json::json!({"command": format!("apt-get update && apt-get install -y {}", package)}),
                priority: 1,
            }]
        }
        // Advisory only: never silently modify files or escalate privileges.
        ErrorKind::PermissionDenied => vec![RecoveryAction {
            description: "Permission denied - review file ownership and permissions".to_string(),
            action_type: RecoveryActionType::NotifyUser,
            params: serde_json::json!({"message": "The operation was denied. Check permissions before retrying."}),
            priority: 1,
        }],
        ErrorKind::SyntaxError => vec![RecoveryAction {
            description: "Syntax error detected - the code needs to be fixed".to_string(),
            action_type: RecoveryActionType::NotifyUser,
            params: serde_json::json!({"message": "The code has a syntax error. Review and fix it."}),
            priority: 1,
        }],
        ErrorKind::NetworkError => vec![RecoveryAction {
            description: "Retry after brief delay (network issue)".to_string(),
            action_type: RecoveryActionType::RetryWithDelay,
            params: serde_json::json!({"delay_secs": 2}),
            priority: 1,
        }],
        ErrorKind::Timeout => vec![RecoveryAction {
            description: "Operation timed out - retry with a longer timeout".to_string(),
            action_type: RecoveryActionType::RetryWithTimeout,
            params: serde_json::json!({"timeout_secs": 60}),
            priority: 1,
        }],
        ErrorKind::Unknown => vec![],
    }
}

/// Normalize an error message so equivalent failures hash identically.
/// Paths, numbers, hex addresses, UUIDs, and quoted strings become tokens.
pub fn normalize_error(error: &str) -> String {
    static UUID_RE: OnceLock<Regex> = OnceLock::new();
    static HEX_RE: OnceLock<Regex> = OnceLock::new();
    static PATH_RE: OnceLock<Regex> = OnceLock::new();
    static QUOTED_RE: OnceLock<Regex> = OnceLock::new();
    static NUM_RE: OnceLock<Regex> = OnceLock::new();

    let uuid_re = UUID_RE.get_or_init(|| {
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .unwrap()
    });
    let hex_re = HEX_RE.get_or_init(|| Regex::new(r"0x[0-9a-fA-F]+").unwrap());
    let path_re = PATH_RE.get_or_init(|| Regex::new(r"(/[\w.\-]+)+/?").unwrap());
    let quoted_re = QUOTED_RE.get_or_init(|| Regex::new(r#""[^"]*"|'[^']*'"#).unwrap());
    let num_re = NUM_RE.get_or_init(|| Regex::new(r"\d+").unwrap());

    let normalized = uuid_re.replace_all(error, "UUID");
    let normalized = hex_re.replace_all(&normalized, "ADDR");
    let normalized = path_re.replace_all(&normalized, "PATH");
    let normalized = quoted_re.replace_all(&normalized, "STR");
    let normalized = num_re.replace_all(&normalized, "N");
    normalized.into_owned()
}

/// One recovery attempt recorded for telemetry
#[derive(Debug, Clone)]
pub struct RecoveryAttempt {
    pub kind: ErrorKind,
    pub original_error: String,
    pub description: String,
    pub success: bool,
    pub attempts: u32,
}

/// Manages error recovery budgets within one task.
pub struct RecoveryManager {
    max_retries: u32,
    retries: HashMap<String, u32>,
    history: Vec<RecoveryAttempt>,
}

impl RecoveryManager {
    pub fn new(max_retries: u32) -> Self {
        RecoveryManager {
            max_retries,
            retries: HashMap::new(),
            history: Vec::new(),
        }
    }

    /// Budget key for an error/action pair
    pub fn error_hash(error: &str, action: &str) -> String {
        let mut hasher = DefaultHasher::new();
        normalize_error(error).hash(&mut hasher);
        format!("{}:{:x}", action, hasher.finish())
    }

    /// Analyze an error. Returns the next candidate to try, or `None` when
    /// the kind is unknown, has no strategies, or the budget is exhausted.
    pub fn analyze(
        &mut self,
        error_message: &str,
        action: &str,
        params: Option<&Value>,
    ) -> Option<RecoveryAction> {
        let hash = Self::error_hash(error_message, action);
        let used = *self.retries.get(&hash).unwrap_or(&0);
        if used >= self.max_retries {
            debug!("Recovery budget exhausted for {}", action);
            return None;
        }

        let (kind, extracted) = detect_error_kind(error_message);
        if kind == ErrorKind::Unknown {
            return None;
        }

        let strategies = recovery_strategies(kind, extracted.as_deref(), params);
        if strategies.is_empty() {
            return None;
        }

        let index = (used as usize).min(strategies.len() - 1);
        let candidate = strategies[index].clone();

        self.retries.insert(hash, used + 1);
        self.history.push(RecoveryAttempt {
            kind,
            original_error: error_message.to_string(),
            description: candidate.description.clone(),
            success: false,
            attempts: used + 1,
        });

        Some(candidate)
    }

    /// Mark the latest attempt as successful and release its budget.
    pub fn record_success(&mut self, error_hash: &str) {
        if let Some(last) = self.history.last_mut() {
            last.success = true;
        }
        self.retries.remove(error_hash);
    }

    /// Reset budgets for a new task
    pub fn reset(&mut self) {
        self.retries.clear();
    }

    /// Recovery attempts so far (telemetry)
    pub fn history(&self) -> &[RecoveryAttempt] {
        &self.history
    }
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new(3)
    }
}
