use crate::agent::tools::Tool;
use crate::utils::env_flag;
use crate::utils::subprocess::scrubbed_command;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// Disables the allowlist and argument checks. Local development only.
pub const UNSAFE_OVERRIDE_ENV: &str = "PICOBOT_EXEC_ALLOW_UNSAFE";

/// Read-only utilities the model may run without the unsafe override.
const SAFE_PROGRAMS: &[&str] = &[
    "cat", "date", "df", "du", "echo", "file", "find", "git", "grep", "head", "ls", "pwd",
    "sleep", "sort", "tail", "uname", "uniq", "wc", "which", "whoami",
];

/// Programs that are never run, override or not.
const BANNED_PROGRAMS: &[&str] = &[
    "dd", "fdisk", "format", "halt", "kill", "killall", "mkfs", "poweroff", "reboot", "rm",
    "shutdown", "su", "sudo",
];

/// Substrings that reject the whole invocation when present anywhere.
const BANNED_SUBSTRINGS: &[&str] = &["rm -rf", "mkfs", ":(){", "> /dev/"];

/// Run a child process from an argv list.
///
/// String-form commands are rejected outright - there is no shell between
/// the model and the kernel, so quoting tricks and `$(...)` have nowhere
/// to run. The default policy additionally requires a bare allowlisted
/// program name, relative argument paths, and no per-program escape
/// payloads (`git -c alias.x=!…`, `find -exec`).
pub struct ExecTool {
    timeout_s: u64,
    working_dir: Option<PathBuf>,
}

impl ExecTool {
    pub fn new(timeout_s: u64) -> Self {
        Self {
            timeout_s,
            working_dir: None,
        }
    }

    pub fn with_workspace(timeout_s: u64, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            timeout_s,
            working_dir: Some(working_dir.into()),
        }
    }

    /// Extract the argv list; the string form is an error by design.
    fn parse_argv(args: &Value) -> Result<Vec<String>> {
        let cmd = args
            .get("cmd")
            .ok_or_else(|| anyhow::anyhow!("'cmd' argument required"))?;
        if cmd.is_string() {
            anyhow::bail!(
                "'cmd' must be a list of strings (argv form); string commands are not allowed"
            );
        }
        let arr = cmd
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("'cmd' must be a list of strings"))?;
        if arr.is_empty() {
            anyhow::bail!("'cmd' must not be empty");
        }
        arr.iter()
            .map(|v| {
                v.as_str()
                    .map(std::string::ToString::to_string)
                    .ok_or_else(|| anyhow::anyhow!("'cmd' entries must all be strings"))
            })
            .collect()
    }

    fn guard(argv: &[String], unsafe_override: bool) -> Result<()> {
        let program = argv[0].as_str();

        // Banned programs and substrings are rejected even under the override.
        let base = program.rsplit('/').next().unwrap_or(program);
        if BANNED_PROGRAMS.contains(&base) {
            anyhow::bail!("program '{}' is banned", base);
        }
        let joined = argv.join(" ");
        for banned in BANNED_SUBSTRINGS {
            if joined.contains(banned) {
                anyhow::bail!("command contains banned sequence '{}'", banned);
            }
        }

        if unsafe_override {
            return Ok(());
        }

        if program.contains('/') || program.contains('\\') {
            anyhow::bail!("program path is not allowed; use a bare program name");
        }
        if !SAFE_PROGRAMS.contains(&program) {
            anyhow::bail!(
                "program '{}' is not in the safe allowlist ({})",
                program,
                SAFE_PROGRAMS.join(", ")
            );
        }

        // Per-program payloads that turn a read-only tool into an
        // arbitrary-command runner.
        match program {
            "git" => {
                if argv[1..].iter().any(|a| a.starts_with("-c")) {
                    anyhow::bail!(
                        "git '-c' is not in the safe allowlist (alias injection risk)"
                    );
                }
            }
            "find" => {
                if argv[1..]
                    .iter()
                    .any(|a| matches!(a.as_str(), "-exec" | "-execdir" | "-ok" | "-okdir"))
                {
                    anyhow::bail!(
                        "find '-exec' is not in the safe allowlist (command execution risk)"
                    );
                }
            }
            _ => {}
        }

        for arg in &argv[1..] {
            if arg.starts_with('/') {
                anyhow::bail!("argument '{}' is an absolute path, which is not allowed", arg);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Run a program with arguments (argv list) and return its output"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "cmd": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Program and arguments as a list, e.g. [\"echo\", \"hello\"]"
                }
            },
            "required": ["cmd"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let argv = Self::parse_argv(&args)?;
        Self::guard(&argv, env_flag(UNSAFE_OVERRIDE_ENV))?;

        let mut cmd = scrubbed_command(&argv[0]);
        cmd.args(&argv[1..]);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_s), cmd.output())
            .await
            .map_err(|_| {
                anyhow::anyhow!("command timed out after {} seconds", self.timeout_s)
            })?
            .map_err(|e| anyhow::anyhow!("failed to run '{}': {}", argv[0], e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.chars().take(500).collect();
            anyhow::bail!(
                "command exited with {}: {}",
                output.status.code().map_or_else(
                    || "signal".to_string(),
                    |c| format!("code {}", c)
                ),
                excerpt.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
