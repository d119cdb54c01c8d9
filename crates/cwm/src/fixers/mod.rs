//! `FixerRegistry`: closed dispatch from `IssueKind` to a
//! fix handler. Every handler is idempotent, bounded to the workspace
//! root, and writes all-or-nothing.

pub mod deps;
pub mod env;
pub mod import;
pub mod lint;
pub mod util;
pub mod yaml;

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::issue::{FixResult, Issue, IssueKind};

pub use lint::FormatterCommand;

/// Dispatch table plus the per-run settings every handler needs
/// (workspace root, `.env` behavior, configured formatters).
pub struct FixerRegistry {
    pub workspace_root: PathBuf,
    pub write_dotenv: bool,
    pub formatter_commands: Vec<FormatterCommand>,
    pub fixer_timeout: Duration,
}

impl FixerRegistry {
    #[must_use]
    pub fn new(workspace_root: PathBuf, write_dotenv: bool) -> Self {
        Self {
            workspace_root,
            write_dotenv,
            formatter_commands: default_formatters(),
            fixer_timeout: lint::DEFAULT_TIMEOUT,
        }
    }

    /// Apply the handler for `issue.kind`. Non-auto-fixable kinds always
    /// return `Skipped("manual")`.
    pub fn apply(&self, issue: &Issue) -> Result<FixResult> {
        match issue.kind {
            IssueKind::MissingDependency => deps::apply(issue, &self.workspace_root),
            IssueKind::ImportError => import::apply(issue, &self.workspace_root),
            IssueKind::MissingEnvVar => {
                env::apply(issue, &self.workspace_root, self.write_dotenv)
            }
            IssueKind::YamlSyntaxError => yaml::apply(issue, &self.workspace_root),
            IssueKind::LintFailure => lint::apply(
                issue,
                &self.workspace_root,
                &self.formatter_commands,
                self.fixer_timeout,
            ),
            IssueKind::TestFailure
            | IssueKind::BuildFailure
            | IssueKind::PermissionError
            | IssueKind::NetworkError
            | IssueKind::Timeout
            | IssueKind::Unknown => Ok(FixResult::Skipped("manual".to_string())),
        }
    }
}

fn default_formatters() -> Vec<FormatterCommand> {
    vec![
        FormatterCommand {
            program: "black".to_string(),
            args: vec![".".to_string()],
        },
        FormatterCommand {
            program: "isort".to_string(),
            args: vec![".".to_string()],
        },
    ]
}
