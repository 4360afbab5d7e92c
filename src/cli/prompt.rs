use async_trait::async_trait;
use docguard::{DecisionPort, RecoveryDecision, RecoveryOption, RecoveryPrompt};
use std::io::{self, BufRead, Write};

/// Interactive decision port reading choices from stdin.
pub struct ConsolePort;

impl ConsolePort {
    fn label(option: RecoveryOption, prompt: &RecoveryPrompt) -> String {
        match option {
            RecoveryOption::RetryRead => "Retry reading the file".to_string(),
            RecoveryOption::RestoreFromRescue => match &prompt.rescue {
                Some(rescue) => format!("Restore emergency copy '{}'", rescue.file_name()),
                None => "Restore emergency copy".to_string(),
            },
            RecoveryOption::CreateDefaultDocument => {
                "Create a new empty document (overwrites the file)".to_string()
            }
            RecoveryOption::AbortWithEmptyDocument => {
                "Continue with an empty document without saving".to_string()
            }
            RecoveryOption::QuitProcess => "Quit".to_string(),
        }
    }

    fn ask(prompt: &RecoveryPrompt) -> io::Result<Option<RecoveryOption>> {
        let options = prompt.options();
        let mut stdout = io::stdout().lock();
        writeln!(stdout)?;
        writeln!(stdout, "Could not load '{}' ({:?})", prompt.path.display(), prompt.kind)?;
        writeln!(stdout, "  {}", prompt.detail)?;
        if let Some(backup) = &prompt.corrupt_backup {
            writeln!(stdout, "  A copy of the damaged file was kept at '{}'", backup.display())?;
        }
        for (index, option) in options.iter().enumerate() {
            writeln!(stdout, "  [{}] {}", index + 1, Self::label(*option, prompt))?;
        }
        write!(stdout, "Choice: ")?;
        stdout.flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(line
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|choice| choice.checked_sub(1))
            .and_then(|index| options.get(index).copied()))
    }
}

#[async_trait]
impl DecisionPort for ConsolePort {
    async fn decide(&self, prompt: &RecoveryPrompt) -> RecoveryDecision {
        let owned = prompt.clone();
        let choice = tokio::task::spawn_blocking(move || Self::ask(&owned))
            .await
            .ok()
            .and_then(|answer| answer.ok())
            .flatten();

        match (choice, &prompt.rescue) {
            (Some(RecoveryOption::RetryRead), _) => RecoveryDecision::RetryRead,
            (Some(RecoveryOption::RestoreFromRescue), Some(rescue)) => {
                RecoveryDecision::RestoreFromRescue(rescue.clone())
            }
            (Some(RecoveryOption::CreateDefaultDocument), _) => {
                RecoveryDecision::CreateDefaultDocument
            }
            (Some(RecoveryOption::AbortWithEmptyDocument), _) => {
                RecoveryDecision::AbortWithEmptyDocument
            }
            // closed stdin or unknown input
            _ => RecoveryDecision::QuitProcess,
        }
    }
}
