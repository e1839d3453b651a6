//! In-process doubles for the external collaborators of a backup run.

use crate::command::{CommandRunner, ExternalCommand};
use crate::prompt::Confirm;
use crate::Result;
use std::collections::VecDeque;
use std::fs;
use std::io::Write;

/// Records every command instead of spawning it.
///
/// Commands whose rendering contains a registered pattern exit with the
/// registered status. Redirected stdout gets a placeholder line so the
/// target file exists afterwards.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    pub commands: Vec<ExternalCommand>,
    failures: Vec<(String, i32)>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make commands containing `pattern` exit with `code`
    pub fn fail_on(mut self, pattern: impl Into<String>, code: i32) -> Self {
        self.failures.push((pattern.into(), code));
        self
    }

    /// Rendered command lines in execution order
    pub fn command_lines(&self) -> Vec<String> {
        self.commands.iter().map(ExternalCommand::display).collect()
    }

    pub fn programs(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.program.as_str()).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&mut self, command: &ExternalCommand, sink: &mut dyn Write) -> Result<i32> {
        let line = command.display();
        self.commands.push(command.clone());

        let code = self
            .failures
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, code)| *code)
            .unwrap_or(0);

        if let Some(ref file) = command.stdout_file {
            let target = match command.current_dir {
                Some(ref dir) if file.is_relative() => dir.join(file),
                _ => file.clone(),
            };
            fs::write(target, format!("output of {}\n", command.program))?;
        }

        write!(sink, "{line}\nexit {code}\n")?;
        Ok(code)
    }
}

/// Answers prompts from a queue and remembers what was asked
#[derive(Debug, Default)]
pub struct ScriptedConfirm {
    answers: VecDeque<bool>,
    /// Answer given once the queue is empty
    pub fallback: bool,
    pub prompts: Vec<String>,
}

impl ScriptedConfirm {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            fallback: false,
            prompts: Vec::new(),
        }
    }

    /// Accept every prompt
    pub fn always_yes() -> Self {
        Self {
            fallback: true,
            ..Self::default()
        }
    }

    pub fn always_no() -> Self {
        Self::default()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&mut self, message: &str, _default: bool) -> bool {
        self.prompts.push(message.to_string());
        self.answers.pop_front().unwrap_or(self.fallback)
    }
}
