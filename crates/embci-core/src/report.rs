//! Result reporting: check tables, labels and comment texts.
//!
//! The forge only ever sees an HTML table (one row per leaf) plus exactly
//! one of the success/failed labels. Root-cause detail stays in the job
//! console.

use embci_forge::ForgeClient;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::capability::BuildRes;
use crate::config::RunContext;
use crate::result::{aggregate, Outcome};

pub const PROCESS_LABEL: &str = "ci_processing";
pub const SUCCESS_LABEL: &str = "ci_successful";
pub const FAILED_LABEL: &str = "ci_failed";

pub const PREEMPT_COMMENT: &str = "you retrigger the gatekeeper, the previous access task will stop and then restart the new access mission";

pub const GATE_CAPTION: &str = "openEuler Embedded gate check - ";
pub const CI_CAPTION: &str = "openEuler Embedded CI - ";

/// One row of a check table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRow {
    pub name: String,
    #[serde(default)]
    pub action: Option<String>,
    pub outcome: Outcome,
    #[serde(default)]
    pub log_url: Option<String>,
}

impl CheckRow {
    pub fn new(name: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            name: name.into(),
            action: None,
            outcome,
            log_url: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_log(mut self, url: impl Into<String>) -> Self {
        self.log_url = Some(url.into());
        self
    }
}

/// Ordered rows of one run plus presentation options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTable {
    pub rows: Vec<CheckRow>,
    /// Pre-formatted duration shown under the caption
    #[serde(default)]
    pub duration: Option<String>,
}

impl CheckTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: CheckRow) {
        self.rows.push(row);
    }

    /// One row per board, the architecture as action.
    pub fn push_build(&mut self, res: &BuildRes) {
        for (arch, board) in res.leaves() {
            self.rows
                .push(CheckRow::new(board.name.clone(), board.result).with_action(arch));
        }
    }

    pub fn with_duration(mut self, duration: Option<String>) -> Self {
        self.duration = duration;
        self
    }

    /// AND over all rows.
    pub fn verdict(&self) -> Outcome {
        aggregate(self.rows.iter().map(|r| r.outcome))
    }

    /// Render as an HTML table headed by `caption_prefix` and the verdict.
    pub fn render_html(&self, caption_prefix: &str) -> String {
        let verdict = self.verdict();
        let verdict_word = if verdict.is_success() { "PASS" } else { "FAILED" };

        let mut out = String::new();
        out.push_str("<table style=\"align: center\">\n");
        out.push_str(&format!(
            "<caption>{}{}{}",
            escape_html(caption_prefix),
            verdict.glyph(),
            verdict_word
        ));
        if let Some(d) = &self.duration {
            out.push_str(&format!("<br>duration <u>{}</u>", escape_html(d)));
        }
        out.push_str("</caption>\n");
        out.push_str(
            "<tr><th>check name</th><th>action</th><th>result</th><th>log</th></tr>\n",
        );
        for row in &self.rows {
            let log = match &row.log_url {
                Some(url) => format!("<a href='{}'>log</a>", escape_html(url)),
                None => String::new(),
            };
            out.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}<strong>{}</strong></td><td>{}</td></tr>\n",
                escape_html(&row.name),
                escape_html(row.action.as_deref().unwrap_or_default()),
                row.outcome.glyph(),
                row.outcome.hint(),
                log
            ));
        }
        out.push_str("</table>");
        out
    }

    /// Gate comment: the table followed by the console link.
    pub fn gate_comment(&self, run: &RunContext) -> String {
        format!(
            "{}\nPlease click <a href={}>here</a> for details",
            self.render_html(GATE_CAPTION),
            run.console_url()
        )
    }
}

/// Comment posted when the gate starts.
pub fn announce_comment(run: &RunContext) -> String {
    format!(
        "the gate is running, if you want to get message immediately, please click <a href={}>here</a> for detail",
        run.console_url()
    )
}

/// Issue title for a failed scheduled build on `branch`.
pub fn ci_issue_title(branch: &str) -> String {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] build failed {}", branch, now)
}

/// `3723000` -> `1h 2m 3s`. Zero units are omitted; zero total is `0s`.
pub fn format_duration_ms(ms: u64) -> String {
    let total = ms / 1000;
    let (hours, rest) = (total / 3600, total % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{}s", seconds));
    }
    parts.join(" ")
}

/// Mark a PR as being processed, clearing stale verdict labels.
pub async fn mark_processing(forge: &dyn ForgeClient, pr_num: u64) {
    forge
        .remove_labels(pr_num, &[SUCCESS_LABEL, FAILED_LABEL])
        .await;
    if !forge.add_labels(pr_num, &[PROCESS_LABEL]).await {
        warn!(pr = pr_num, "could not set processing label");
    }
}

/// Leave exactly one verdict label on the PR.
pub async fn apply_verdict(forge: &dyn ForgeClient, pr_num: u64, verdict: Outcome) {
    let (set, other) = match verdict {
        Outcome::Success => (SUCCESS_LABEL, FAILED_LABEL),
        Outcome::Failure => (FAILED_LABEL, SUCCESS_LABEL),
    };
    forge.remove_labels(pr_num, &[PROCESS_LABEL, other]).await;
    if forge.add_labels(pr_num, &[set]).await {
        info!(pr = pr_num, label = set, "verdict label set");
    } else {
        warn!(pr = pr_num, label = set, "could not set verdict label");
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Arch, Board};
    use embci_forge::fakes::MemoryForge;

    #[test]
    fn test_table_rows_and_verdict() {
        let mut table = CheckTable::new();
        table.push(CheckRow::new("check_commit_msg", Outcome::Success));
        table.push_build(&BuildRes::new(vec![Arch::new(
            "aarch64",
            vec![Board::new("openeuler-image(qemu-aarch64)", Outcome::Failure)],
        )]));
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].action.as_deref(), Some("aarch64"));
        assert_eq!(table.verdict(), Outcome::Failure);

        let html = table.render_html(GATE_CAPTION);
        assert!(html.contains(":x:FAILED</caption>"));
        assert!(html.contains("<td>check_commit_msg</td>"));
        assert!(html.contains(":x:<strong>FAILED</strong>"));
        assert!(html.contains(" :white_check_mark: <strong>SUCCESS</strong>"));
    }

    #[test]
    fn test_empty_table_passes() {
        let html = CheckTable::new().render_html(GATE_CAPTION);
        assert!(html.contains("PASS</caption>"));
    }

    #[test]
    fn test_gate_comment_links_console() {
        let run = RunContext::new("gate", 7, "https://ci/job/gate/7/");
        let mut table = CheckTable::new().with_duration(Some("1m".to_string()));
        table.push(CheckRow::new("doc_build_check", Outcome::Success).with_log("https://ci/x"));
        let comment = table.gate_comment(&run);
        assert!(comment.contains("<br>duration <u>1m</u>"));
        assert!(comment.contains("<a href='https://ci/x'>log</a>"));
        assert!(comment.ends_with("<a href=https://ci/job/gate/7/console>here</a> for details"));
    }

    #[test]
    fn test_cells_are_escaped() {
        let mut table = CheckTable::new();
        table.push(CheckRow::new("<script>", Outcome::Success));
        assert!(table.render_html("").contains("&lt;script&gt;"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration_ms(3_723_000), "1h 2m 3s");
        assert_eq!(format_duration_ms(60_000), "1m");
        assert_eq!(format_duration_ms(999), "0s");
        assert_eq!(format_duration_ms(7_200_500), "2h");
    }

    #[tokio::test]
    async fn test_labels_leave_exactly_one_verdict() {
        let forge = MemoryForge::default();
        forge.add_labels(1, &[SUCCESS_LABEL]).await;
        mark_processing(&forge, 1).await;
        assert_eq!(
            forge.labels(1).into_iter().collect::<Vec<_>>(),
            vec![PROCESS_LABEL]
        );

        apply_verdict(&forge, 1, Outcome::Failure).await;
        assert_eq!(
            forge.labels(1).into_iter().collect::<Vec<_>>(),
            vec![FAILED_LABEL]
        );

        apply_verdict(&forge, 1, Outcome::Success).await;
        assert_eq!(
            forge.labels(1).into_iter().collect::<Vec<_>>(),
            vec![SUCCESS_LABEL]
        );
    }
}
