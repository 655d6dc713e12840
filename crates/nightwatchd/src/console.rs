//! Operator console - the human side of the loop.
//!
//! Three dialogs share one prompt-and-read-a-line shape: feasibility
//! questions, plan approval and escalation. They are deliberately not part
//! of the capability library's dispatch; the orchestrator drives them
//! inline because they consume arguments from the current turn and may
//! terminate the incident.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use async_trait::async_trait;
use owo_colors::OwoColorize;

use nightwatch_common::plan::RemediationPlan;

/// Operator verdict on a validated plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    /// Rejection always carries feedback for the next planning pass.
    Rejected(String),
}

/// Operator verdict on an escalation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// Stop working on this incident
    Dismissed,
    /// Keep going, armed with this context
    Context(String),
}

#[async_trait]
pub trait OperatorConsole: Send + Sync {
    /// Ask one feasibility question. `None` means the operator skipped.
    async fn ask_question(&self, question: &str) -> Result<Option<String>>;

    async fn approve_plan(&self, plan: &RemediationPlan) -> Result<ApprovalOutcome>;

    async fn escalate(&self, reason: &str, needed_context: &str) -> Result<EscalationOutcome>;
}

/// Interactive terminal dialogs.
#[derive(Debug, Clone, Default)]
pub struct TerminalConsole;

impl TerminalConsole {
    pub fn new() -> Self {
        Self
    }
}

/// Blocking line read, off the async runtime's worker threads.
async fn read_line(prompt: String) -> Result<String> {
    tokio::task::spawn_blocking(move || -> Result<String> {
        print!("{}", prompt);
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().lock().read_line(&mut input)?;
        Ok(input.trim().to_string())
    })
    .await
    .context("console reader task failed")?
}

#[async_trait]
impl OperatorConsole for TerminalConsole {
    async fn ask_question(&self, question: &str) -> Result<Option<String>> {
        println!();
        println!(
            "{}  {}",
            "?".bright_cyan().bold(),
            "Nightwatch needs more information".bright_white().bold()
        );
        println!("   {}", question.bright_white());
        println!("   {}", "(empty line or 'skip' to decline)".dimmed());

        let input = read_line(format!("   {}  ", "Your answer:".bright_magenta())).await?;
        if input.is_empty() || input.eq_ignore_ascii_case("skip") {
            println!("   {}  No answer provided", "~".yellow());
            Ok(None)
        } else {
            Ok(Some(input))
        }
    }

    async fn approve_plan(&self, plan: &RemediationPlan) -> Result<ApprovalOutcome> {
        println!();
        println!(
            "{}  {}",
            "!".bright_yellow().bold(),
            "Remediation plan awaiting approval".bright_white().bold()
        );
        println!("   {}", plan.summary.bright_white());
        println!();
        for (i, step) in plan.steps.iter().enumerate() {
            println!("   {}  {}", format!("[{}]", i + 1).cyan(), step.action.bright_white());
            println!("        {}", step.reason.dimmed());
        }
        if !plan.verification.is_empty() {
            println!("   {}", "verification:".dimmed());
            for step in &plan.verification {
                println!("   {}  {}", "·".cyan(), step.action);
            }
        }
        println!();

        let input = read_line(format!("   {}  ", "Approve? [y/N]:".bright_magenta())).await?;
        if matches!(input.to_lowercase().as_str(), "y" | "yes") {
            println!("   {}  Plan approved", "+".bright_green());
            return Ok(ApprovalOutcome::Approved);
        }

        // Rejection requires feedback the planner can act on.
        loop {
            let feedback =
                read_line(format!("   {}  ", "Why not? (required):".bright_magenta())).await?;
            if !feedback.is_empty() {
                println!("   {}  Plan rejected", "-".dimmed());
                return Ok(ApprovalOutcome::Rejected(feedback));
            }
        }
    }

    async fn escalate(&self, reason: &str, needed_context: &str) -> Result<EscalationOutcome> {
        println!();
        println!(
            "{}  {}",
            "!".bright_red().bold(),
            "Incident escalated to you".bright_white().bold()
        );
        println!("   {}  {}", "Reason:".cyan(), reason.bright_white());
        println!("   {}  {}", "Needed:".cyan(), needed_context);
        println!(
            "   {}",
            "(type context to continue, or empty/'stop'/'dismiss' to drop the incident)".dimmed()
        );

        let input = read_line(format!("   {}  ", "Context:".bright_magenta())).await?;
        if input.is_empty()
            || input.eq_ignore_ascii_case("stop")
            || input.eq_ignore_ascii_case("dismiss")
        {
            println!("   {}  Incident dismissed", "-".dimmed());
            Ok(EscalationOutcome::Dismissed)
        } else {
            println!("   {}  Continuing with your context", "+".bright_green());
            Ok(EscalationOutcome::Context(input))
        }
    }
}

/// Scripted console for tests: queued answers, consumed in order.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    answers: std::sync::Mutex<Vec<Option<String>>>,
    approvals: std::sync::Mutex<Vec<ApprovalOutcome>>,
    escalations: std::sync::Mutex<Vec<EscalationOutcome>>,
    questions_seen: std::sync::Mutex<Vec<String>>,
    escalations_seen: std::sync::Mutex<Vec<String>>,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(self, answer: Option<&str>) -> Self {
        self.answers
            .lock()
            .unwrap()
            .push(answer.map(|s| s.to_string()));
        self
    }

    pub fn with_approval(self, outcome: ApprovalOutcome) -> Self {
        self.approvals.lock().unwrap().push(outcome);
        self
    }

    pub fn with_escalation(self, outcome: EscalationOutcome) -> Self {
        self.escalations.lock().unwrap().push(outcome);
        self
    }

    pub fn questions_seen(&self) -> Vec<String> {
        self.questions_seen.lock().unwrap().clone()
    }

    pub fn escalations_seen(&self) -> Vec<String> {
        self.escalations_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl OperatorConsole for ScriptedConsole {
    async fn ask_question(&self, question: &str) -> Result<Option<String>> {
        self.questions_seen
            .lock()
            .unwrap()
            .push(question.to_string());
        let mut answers = self.answers.lock().unwrap();
        if answers.is_empty() {
            Ok(None)
        } else {
            Ok(answers.remove(0))
        }
    }

    async fn approve_plan(&self, _plan: &RemediationPlan) -> Result<ApprovalOutcome> {
        let mut approvals = self.approvals.lock().unwrap();
        if approvals.is_empty() {
            Ok(ApprovalOutcome::Approved)
        } else {
            Ok(approvals.remove(0))
        }
    }

    async fn escalate(&self, reason: &str, _needed_context: &str) -> Result<EscalationOutcome> {
        self.escalations_seen
            .lock()
            .unwrap()
            .push(reason.to_string());
        let mut escalations = self.escalations.lock().unwrap();
        if escalations.is_empty() {
            Ok(EscalationOutcome::Dismissed)
        } else {
            Ok(escalations.remove(0))
        }
    }
}
