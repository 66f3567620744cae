#![allow(dead_code)]

use std::path::{Path, PathBuf};

use warden::record::{Command, RecordSpec};

/// Builder for `RecordSpec` to simplify test setup.
pub struct RecordSpecBuilder {
    spec: RecordSpec,
}

impl RecordSpecBuilder {
    pub fn new(cmd: impl Into<Command>) -> Self {
        Self {
            spec: RecordSpec::new(cmd),
        }
    }

    /// `argv` passed through unchanged.
    pub fn argv(args: &[&str]) -> Self {
        Self::new(Command::Argv(args.iter().map(|s| s.to_string()).collect()))
    }

    pub fn name(mut self, name: &str) -> Self {
        self.spec.name = Some(name.to_string());
        self
    }

    pub fn id(mut self, id: u32) -> Self {
        self.spec.id = Some(id);
        self
    }

    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.spec.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    pub fn interpreter(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec.interpreter = Some(path.into());
        self
    }

    pub fn shell(mut self) -> Self {
        self.spec.shell = true;
        self
    }

    pub fn nohup(mut self) -> Self {
        self.spec.nohup = true;
        self
    }

    pub fn autorun(mut self) -> Self {
        self.spec.autorun = true;
        self
    }

    pub fn stdout(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec.stdout_path = Some(path.into());
        self
    }

    pub fn max_restart(mut self, n: u32) -> Self {
        self.spec.max_restart = Some(n);
        self
    }

    pub fn build(self) -> RecordSpec {
        self.spec
    }
}
