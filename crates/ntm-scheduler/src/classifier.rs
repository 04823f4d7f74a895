//! Task classification via a fixed alias table (§4.10).

use ntm_core::task::TaskType;

const ALIASES: &[(&str, TaskType)] = &[
    ("bug", TaskType::Bug),
    ("fix", TaskType::Bug),
    ("broken", TaskType::Bug),
    ("error", TaskType::Bug),
    ("crash", TaskType::Bug),
    ("feature", TaskType::Feature),
    ("implement", TaskType::Feature),
    ("add", TaskType::Feature),
    ("new", TaskType::Feature),
    ("refactor", TaskType::Refactor),
    ("cleanup", TaskType::Refactor),
    ("restructure", TaskType::Refactor),
    ("test", TaskType::Test),
    ("spec", TaskType::Test),
    ("coverage", TaskType::Test),
    ("doc", TaskType::Docs),
    ("docs", TaskType::Docs),
    ("readme", TaskType::Docs),
    ("review", TaskType::Review),
    ("audit", TaskType::Review),
];

/// Classify a free-text task description by the first alias word it
/// contains; falls back to `TaskType::General` when nothing matches.
pub fn classify(description: &str) -> TaskType {
    let lower = description.to_ascii_lowercase();
    let words: Vec<&str> = lower.split(|c: char| !c.is_ascii_alphanumeric()).collect();

    for (alias, task_type) in ALIASES {
        if words.contains(alias) {
            return *task_type;
        }
    }
    TaskType::General
}
