//! Knowledge store - operator answers that survive across sessions.
//!
//! A plain markdown file with a fixed header; every fact is one appended
//! `- <question> → <answer>` line. Written when the operator answers a
//! feasibility question or provides escalation context, read back before
//! feasibility and planning calls. Absent or header-only files read as
//! empty.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const KNOWLEDGE_HEADER: &str = "# Nightwatch Knowledge";

const FACT_SEPARATOR: &str = " → ";

/// One persisted question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub question: String,
    pub answer: String,
}

/// Append-only fact store backed by a markdown file.
#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    path: PathBuf,
}

impl KnowledgeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All recorded facts, oldest first. A missing file is an empty store.
    pub fn facts(&self) -> Result<Vec<Fact>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read knowledge store {}", self.path.display()))?;

        Ok(contents
            .lines()
            .filter_map(|line| {
                let line = line.strip_prefix("- ")?;
                let (question, answer) = line.split_once(FACT_SEPARATOR)?;
                Some(Fact {
                    question: question.trim().to_string(),
                    answer: answer.trim().to_string(),
                })
            })
            .collect())
    }

    /// All facts as one block suitable for a prompt, empty string when none.
    pub fn facts_as_string(&self) -> String {
        match self.facts() {
            Ok(facts) if !facts.is_empty() => facts
                .iter()
                .map(|f| format!("- {}{}{}", f.question, FACT_SEPARATOR, f.answer))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }

    /// Append one fact, creating the file with its header on first write.
    pub fn append(&self, question: &str, answer: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create knowledge directory {}", parent.display())
                })?;
            }
        }

        let fresh = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open knowledge store {}", self.path.display()))?;

        if fresh {
            writeln!(file, "{}", KNOWLEDGE_HEADER)?;
            writeln!(file)?;
        }
        writeln!(
            file,
            "- {}{}{}",
            question.trim().replace('\n', " "),
            FACT_SEPARATOR,
            answer.trim().replace('\n', " ")
        )?;
        tracing::debug!("fact recorded: {}", question.trim());
        Ok(())
    }
}
