//! Session data model shared by the store, the status detector and the UI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Namespaced session key, `<repository>-<issue>` for issue sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn for_issue(repository_name: &str, issue_number: u64) -> Self {
        Self(format!("{repository_name}-{issue_number}"))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Persisted description of one work session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub namespaced_id: SessionId,
    pub issue_number: u64,
    #[serde(default)]
    pub issue_title: String,
    pub repository_name: String,
    pub repository_root: PathBuf,
    pub branch: String,
    pub worktree_path: PathBuf,
    pub multiplexer_session: String,
    /// Absent for records written before sandboxes were named explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_name: Option<String>,
    /// RFC 3339. Kept verbatim so a corrupt value degrades to "unknown"
    /// instead of failing the whole load.
    pub last_activity: String,
}

impl SessionRecord {
    pub fn effective_sandbox_name(&self) -> String {
        match &self.sandbox_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => default_sandbox_name(&self.namespaced_id),
        }
    }

    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(self.last_activity.trim())
            .ok()
            .map(|at| at.with_timezone(&Utc))
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_activity = at.to_rfc3339();
    }

    pub fn in_scope(&self, scope: &ViewScope) -> bool {
        match scope {
            ViewScope::Global => true,
            ViewScope::Repository { root } => same_path(&self.repository_root, root),
        }
    }
}

fn same_path(left: &Path, right: &Path) -> bool {
    left.components().eq(right.components())
}

/// Deterministic sandbox name derived from the session id.
pub fn default_sandbox_name(id: &SessionId) -> String {
    let sanitized: String = id
        .0
        .to_lowercase()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-') {
                ch
            } else {
                '-'
            }
        })
        .collect();
    format!("hatch-{sanitized}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Stopped,
    Stale,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Active => "active",
            SessionState::Stopped => "stopped",
            SessionState::Stale => "stale",
        }
    }

    /// Reconciles the two probe results. Anything short of both resources
    /// being live is not `Active`.
    pub fn from_probes(multiplexer_alive: bool, sandbox_alive: bool) -> Self {
        match (multiplexer_alive, sandbox_alive) {
            (true, true) => SessionState::Active,
            (false, false) => SessionState::Stale,
            _ => SessionState::Stopped,
        }
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "active" => Ok(SessionState::Active),
            "stopped" => Ok(SessionState::Stopped),
            "stale" => Ok(SessionState::Stale),
            other => Err(format!(
                "invalid session state '{other}'. valid values: active, stopped, stale"
            )),
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived status of a session at one instant. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub time_delta: String,
    pub multiplexer_alive: bool,
    pub sandbox_alive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewScope {
    Repository { root: PathBuf },
    Global,
}

impl ViewScope {
    pub fn label(&self) -> String {
        match self {
            ViewScope::Global => "global".to_string(),
            ViewScope::Repository { root } => root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| root.display().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{default_sandbox_name, SessionId, SessionRecord, SessionState, ViewScope};
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;
    use std::str::FromStr;

    fn mk_record(id: &str) -> SessionRecord {
        SessionRecord {
            namespaced_id: SessionId::new(id),
            issue_number: 42,
            issue_title: "Fix login".to_string(),
            repository_name: "repo".to_string(),
            repository_root: PathBuf::from("/src/repo"),
            branch: "issue-42-fix-login".to_string(),
            worktree_path: PathBuf::from("/tmp/wt"),
            multiplexer_session: id.to_string(),
            sandbox_name: None,
            last_activity: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn session_id_for_issue_joins_repository_and_number() {
        assert_eq!(SessionId::for_issue("repo", 42), SessionId::new("repo-42"));
        assert_eq!(SessionId::new("repo-42").to_string(), "repo-42");
    }

    #[test]
    fn effective_sandbox_name_prefers_stored_name() {
        let mut record = mk_record("repo-42");
        assert_eq!(record.effective_sandbox_name(), "hatch-repo-42");

        record.sandbox_name = Some("custom-box".to_string());
        assert_eq!(record.effective_sandbox_name(), "custom-box");

        record.sandbox_name = Some("   ".to_string());
        assert_eq!(record.effective_sandbox_name(), "hatch-repo-42");
    }

    #[test]
    fn default_sandbox_name_sanitizes_id() {
        assert_eq!(
            default_sandbox_name(&SessionId::new("My Repo/42")),
            "hatch-my-repo-42"
        );
    }

    #[test]
    fn last_activity_parses_rfc3339_and_tolerates_garbage() {
        let mut record = mk_record("repo-42");
        assert_eq!(
            record.last_activity_at(),
            Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
        );

        record.last_activity = "yesterday-ish".to_string();
        assert_eq!(record.last_activity_at(), None);

        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        record.touch(at);
        assert_eq!(record.last_activity_at(), Some(at));
    }

    #[test]
    fn in_scope_matches_repository_root() {
        let record = mk_record("repo-42");
        assert!(record.in_scope(&ViewScope::Global));
        assert!(record.in_scope(&ViewScope::Repository {
            root: PathBuf::from("/src/repo/")
        }));
        assert!(!record.in_scope(&ViewScope::Repository {
            root: PathBuf::from("/src/other")
        }));
    }

    #[test]
    fn session_state_reconciles_probe_pairs() {
        assert_eq!(SessionState::from_probes(true, true), SessionState::Active);
        assert_eq!(SessionState::from_probes(true, false), SessionState::Stopped);
        assert_eq!(SessionState::from_probes(false, true), SessionState::Stopped);
        assert_eq!(SessionState::from_probes(false, false), SessionState::Stale);
    }

    #[test]
    fn session_state_parses_and_displays() {
        assert_eq!(SessionState::from_str(" Stale "), Ok(SessionState::Stale));
        assert_eq!(SessionState::Active.to_string(), "active");
        assert!(SessionState::from_str("zombie")
            .expect_err("unknown state")
            .contains("valid values"));
    }

    #[test]
    fn view_scope_label_uses_repository_directory_name() {
        assert_eq!(ViewScope::Global.label(), "global");
        assert_eq!(
            ViewScope::Repository {
                root: PathBuf::from("/src/widgets")
            }
            .label(),
            "widgets"
        );
    }
}
