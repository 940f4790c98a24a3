//! PLAN task parsing and mutation.
//!
//! Tasks are checkbox items under the `## Tasks` heading. The N-th task
//! line (1-based) yields the id `task-N`; ids are stable for the lifetime
//! of one read and are never persisted.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_TASK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*- \[( |x|X)\] (.*)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanTask {
    /// 1-based position within the Tasks section.
    pub ordinal: usize,
    /// `task-<ordinal>`.
    pub id: String,
    pub title: String,
    pub done: bool,
}

fn tasks_section(markdown: &str) -> impl Iterator<Item = &str> {
    let mut in_section = false;
    markdown.lines().filter(move |line| {
        let trimmed = line.trim();
        if trimmed == "## Tasks" {
            in_section = true;
            return false;
        }
        if in_section && trimmed.starts_with("## ") {
            in_section = false;
        }
        in_section
    })
}

pub fn parse_tasks(markdown: &str) -> Vec<PlanTask> {
    let mut tasks = Vec::new();
    for line in tasks_section(markdown) {
        if let Some(caps) = RE_TASK.captures(line) {
            let ordinal = tasks.len() + 1;
            tasks.push(PlanTask {
                ordinal,
                id: format!("task-{ordinal}"),
                title: caps[2].trim().to_string(),
                done: !caps[1].eq(" "),
            });
        }
    }
    tasks
}

pub fn first_pending(markdown: &str) -> Option<PlanTask> {
    parse_tasks(markdown).into_iter().find(|t| !t.done)
}

pub fn has_pending(markdown: &str) -> bool {
    first_pending(markdown).is_some()
}

/// Flip the N-th task's checkbox to done. Idempotent when the task is
/// already complete. Returns `None` when no such task exists.
pub fn mark_complete(markdown: &str, ordinal: usize) -> Option<String> {
    if ordinal == 0 {
        return None;
    }
    let mut seen = 0usize;
    let mut in_section = false;
    let mut found = false;
    let mut out = Vec::with_capacity(markdown.lines().count());

    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed == "## Tasks" {
            in_section = true;
        } else if in_section && trimmed.starts_with("## ") {
            in_section = false;
        }

        if in_section && RE_TASK.is_match(line) {
            seen += 1;
            if seen == ordinal {
                found = true;
                out.push(line.replacen("- [ ]", "- [x]", 1));
                continue;
            }
        }
        out.push(line.to_string());
    }

    if !found {
        return None;
    }
    let mut result = out.join("\n");
    if markdown.ends_with('\n') {
        result.push('\n');
    }
    Some(result)
}

/// Line format for tasks created from internal drives.
pub fn generated_task_line(title: &str, date: NaiveDate) -> String {
    format!("- [ ] {} [ID-generated {}]", title.trim(), date.format("%Y-%m-%d"))
}

/// The current goal is the first top-level heading's text.
pub fn current_goal(markdown: &str) -> Option<String> {
    markdown
        .lines()
        .find(|l| l.starts_with("# "))
        .map(|l| l[2..].trim().to_string())
}
