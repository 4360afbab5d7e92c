//! Shared fixtures for integration tests: a fault-injecting filesystem and a
//! scripted decision port.

#![allow(dead_code)]

use async_trait::async_trait;
use docguard::storage::fs::{FileSystem, TokioFs};
use docguard::{DecisionPort, RecoveryDecision, RecoveryPrompt, StoreConfig};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub fn sandbox() -> (TempDir, StoreConfig) {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::rooted_at(dir.path()).fast_retries();
    (dir, config)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    WriteSynced,
    Write,
    Read,
    Rename,
    Copy,
    Remove,
    CreateDir,
    List,
}

struct Fault {
    op: Op,
    suffix: String,
    remaining: usize,
    kind: io::ErrorKind,
}

struct Stale {
    suffix: String,
    remaining: usize,
    content: String,
}

/// `TokioFs` wrapper that fails or delays selected operations.
///
/// Faults match on the operation and on the end of the (first) path, so
/// `".tmp"` targets temp files and `"data.json"` the committed document.
#[derive(Default)]
pub struct FaultyFs {
    inner: TokioFs,
    faults: Mutex<Vec<Fault>>,
    stale: Mutex<Vec<Stale>>,
    delays: Mutex<Vec<(Op, String, Duration)>>,
    log: Mutex<Vec<(Op, PathBuf)>>,
}

impl FaultyFs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, op: Op, suffix: &str, times: usize, kind: io::ErrorKind) {
        self.faults.lock().unwrap().push(Fault {
            op,
            suffix: suffix.to_string(),
            remaining: times,
            kind,
        });
    }

    pub fn fail_always(&self, op: Op, suffix: &str, kind: io::ErrorKind) {
        self.fail(op, suffix, usize::MAX, kind);
    }

    /// The next `times` reads of a matching path return `content`.
    pub fn stale_reads(&self, suffix: &str, times: usize, content: &str) {
        self.stale.lock().unwrap().push(Stale {
            suffix: suffix.to_string(),
            remaining: times,
            content: content.to_string(),
        });
    }

    pub fn delay(&self, op: Op, suffix: &str, by: Duration) {
        self.delays
            .lock()
            .unwrap()
            .push((op, suffix.to_string(), by));
    }

    pub fn clear_faults(&self) {
        self.faults.lock().unwrap().clear();
        self.stale.lock().unwrap().clear();
    }

    pub fn ops(&self) -> Vec<(Op, PathBuf)> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, op: Op, suffix: &str) -> usize {
        self.ops()
            .iter()
            .filter(|(logged, path)| *logged == op && ends_with(path, suffix))
            .count()
    }

    async fn check(&self, op: Op, path: &Path) -> io::Result<()> {
        self.log.lock().unwrap().push((op, path.to_path_buf()));

        let delay = self
            .delays
            .lock()
            .unwrap()
            .iter()
            .find(|(delayed, suffix, _)| *delayed == op && ends_with(path, suffix))
            .map(|(_, _, by)| *by);
        if let Some(by) = delay {
            tokio::time::sleep(by).await;
        }

        let mut faults = self.faults.lock().unwrap();
        if let Some(fault) = faults
            .iter_mut()
            .find(|fault| fault.op == op && fault.remaining > 0 && ends_with(path, &fault.suffix))
        {
            fault.remaining = fault.remaining.saturating_sub(1);
            return Err(io::Error::new(fault.kind, "injected fault"));
        }
        Ok(())
    }

    fn take_stale(&self, path: &Path) -> Option<String> {
        let mut stale = self.stale.lock().unwrap();
        let entry = stale
            .iter_mut()
            .find(|entry| entry.remaining > 0 && ends_with(path, &entry.suffix))?;
        entry.remaining -= 1;
        Some(entry.content.clone())
    }
}

fn ends_with(path: &Path, suffix: &str) -> bool {
    path.to_string_lossy().ends_with(suffix)
}

#[async_trait]
impl FileSystem for FaultyFs {
    async fn write_synced(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.check(Op::WriteSynced, path).await?;
        self.inner.write_synced(path, bytes).await
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.check(Op::Write, path).await?;
        self.inner.write(path, bytes).await
    }

    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.check(Op::Read, path).await?;
        if let Some(content) = self.take_stale(path) {
            return Ok(content);
        }
        self.inner.read_to_string(path).await
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.check(Op::Read, path).await?;
        self.inner.read(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.check(Op::Rename, from).await?;
        self.inner.rename(from, to).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        self.check(Op::Copy, from).await?;
        self.inner.copy(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.check(Op::Remove, path).await?;
        self.inner.remove_file(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.check(Op::CreateDir, path).await?;
        self.inner.create_dir_all(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path).await
    }

    async fn list_file_names(&self, dir: &Path) -> io::Result<Vec<String>> {
        self.check(Op::List, dir).await?;
        self.inner.list_file_names(dir).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Retry,
    RestoreOffered,
    CreateDefault,
    Abort,
    Quit,
}

/// Decision port answering from a script and recording every prompt.
/// Once the script runs out it answers `QuitProcess`.
#[derive(Default)]
pub struct ScriptedPort {
    answers: Mutex<VecDeque<Answer>>,
    prompts: Mutex<Vec<RecoveryPrompt>>,
}

impl ScriptedPort {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// A port that is not expected to be asked anything.
    pub fn silent() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn prompts(&self) -> Vec<RecoveryPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionPort for ScriptedPort {
    async fn decide(&self, prompt: &RecoveryPrompt) -> RecoveryDecision {
        self.prompts.lock().unwrap().push(prompt.clone());
        let answer = self.answers.lock().unwrap().pop_front();
        match answer {
            Some(Answer::Retry) => RecoveryDecision::RetryRead,
            Some(Answer::RestoreOffered) => match &prompt.rescue {
                Some(rescue) => RecoveryDecision::RestoreFromRescue(rescue.clone()),
                None => RecoveryDecision::QuitProcess,
            },
            Some(Answer::CreateDefault) => RecoveryDecision::CreateDefaultDocument,
            Some(Answer::Abort) => RecoveryDecision::AbortWithEmptyDocument,
            Some(Answer::Quit) | None => RecoveryDecision::QuitProcess,
        }
    }
}
