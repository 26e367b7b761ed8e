//! Helpers for running the `streamdrop` binary in tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Settings every test pins so the host environment cannot leak in
const ISOLATED_VARS: [&str; 4] = ["CHUNK_SIZE", "STREAM_TIMEOUT", "FILE_SUFFIX", "S3_BUCKET"];

/// CLI command builder
pub struct SdCommand {
    working_dir: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl SdCommand {
    /// Command run in `working_dir` with its checkpoints in a sled database there
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        let working_dir = working_dir.as_ref().to_path_buf();
        let mut env = HashMap::new();
        env.insert("REDIS_URL".to_string(), sled_url(&working_dir));
        env.insert(
            "STATE_DIR".to_string(),
            working_dir.join("state").display().to_string(),
        );
        env.insert("WATCH_DIR".to_string(), working_dir.display().to_string());

        Self {
            working_dir,
            args: Vec::new(),
            env,
        }
    }

    pub fn args(&mut self, args: &[&str]) -> &mut Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn env(&mut self, key: &str, value: &str) -> &mut Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn execute(&self) -> CommandResult {
        let mut command = Command::new(env!("CARGO_BIN_EXE_streamdrop"));
        for var in ISOLATED_VARS {
            command.env_remove(var);
        }
        let output = command
            .args(&self.args)
            .current_dir(&self.working_dir)
            .envs(&self.env)
            .env("RUST_LOG", "warn")
            .output()
            .expect("failed to run streamdrop");

        CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        }
    }

    pub fn assert_success(&self) -> CommandResult {
        let result = self.execute();
        assert!(
            result.success(),
            "Command failed (exit code: {}):\nArgs: {:?}\nStdout: {}\nStderr: {}",
            result.exit_code,
            self.args,
            result.stdout,
            result.stderr
        );
        result
    }

    pub fn assert_failure(&self) -> CommandResult {
        let result = self.execute();
        assert!(
            !result.success(),
            "Command should have failed but succeeded:\nArgs: {:?}\nStdout: {}",
            self.args,
            result.stdout
        );
        result
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Checkpoint store URL used by [`SdCommand::new`]
pub fn sled_url(dir: &Path) -> String {
    format!("sled:{}", dir.join("checkpoints").display())
}

/// Usage: `sd!(dir, "status").assert_success()`
#[macro_export]
macro_rules! sd {
    ($dir:expr, $($arg:expr),*) => {{
        let mut cmd = $crate::common::SdCommand::new($dir);
        cmd.args(&[$($arg),*]);
        cmd
    }};
}
