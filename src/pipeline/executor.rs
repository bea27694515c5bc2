// src/pipeline/executor.rs

//! Sequential step execution
//!
//! Stages of a step run left to right. Every stage but the last has its
//! standard output (and error) captured; the captured output becomes the next
//! stage's standard input. The last stage inherits the parent's streams.
//!
//! Any stage exiting unsuccessfully aborts the whole pipeline with
//! [`Error::StepFailed`]; later stages and steps never run.

use super::PipelineStep;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, info, warn};

/// Run `steps` in order, stopping at the first failure
///
/// Every step is validated before the first one starts.
pub fn run(steps: &[PipelineStep]) -> Result<()> {
    for step in steps {
        step.stages()?;
    }

    let total = steps.len();
    for (i, step) in steps.iter().enumerate() {
        info!("[{}/{}] {}", i + 1, total, step);
        run_step(step)?;
    }

    info!("Pipeline finished ({} step(s))", total);
    Ok(())
}

/// Run a single step with inherited output
pub fn run_step(step: &PipelineStep) -> Result<()> {
    execute(step, false, true).map(|_| ())
}

/// Run a single step and return the last stage's standard output
pub fn capture(step: &PipelineStep) -> Result<Vec<u8>> {
    execute(step, true, true)
}

/// Like [`capture`], but the last stage's exit status is not checked
///
/// For commands that answer through their exit code as well as their
/// output, such as `systemctl is-enabled`.
pub fn query(step: &PipelineStep) -> Result<Vec<u8>> {
    execute(step, true, false)
}

fn execute(step: &PipelineStep, capture_last: bool, check_last: bool) -> Result<Vec<u8>> {
    let stages = step.stages()?;
    let last = stages.len() - 1;

    let mut input: Option<Vec<u8>> = None;
    for (i, argv) in stages.into_iter().enumerate() {
        let stage = Stage {
            argv,
            env: step.env.as_ref(),
            capture_stdout: i < last || capture_last,
            capture_stderr: i < last || !check_last,
            check_status: i < last || check_last,
        };
        input = Some(stage.run(input.take())?);
    }

    Ok(input.unwrap_or_default())
}

struct Stage<'a> {
    argv: &'a [String],
    env: Option<&'a BTreeMap<String, String>>,
    capture_stdout: bool,
    capture_stderr: bool,
    check_status: bool,
}

impl Stage<'_> {
    fn run(&self, input: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let command_line = self.argv.join(" ");
        debug!("Spawning: {}", command_line);

        let mut command = Command::new(&self.argv[0]);
        command.args(&self.argv[1..]);
        if let Some(env) = self.env {
            command.envs(env);
        }
        command
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::inherit() })
            .stdout(if self.capture_stdout { Stdio::piped() } else { Stdio::inherit() })
            .stderr(if self.capture_stderr { Stdio::piped() } else { Stdio::inherit() });

        let mut child = command.spawn().map_err(|source| Error::Spawn {
            command: command_line.clone(),
            source,
        })?;

        // Feed input from a separate thread so a stage producing lots of
        // output cannot deadlock against us.
        let stdin = child.stdin.take();
        let output = thread::scope(|scope| {
            if let (Some(input), Some(mut stdin)) = (input, stdin) {
                scope.spawn(move || {
                    // The stage may exit without reading everything
                    if let Err(e) = stdin.write_all(&input) {
                        debug!("Stage closed its input early: {}", e);
                    }
                });
            }
            child.wait_with_output()
        })?;

        if !output.status.success() && !self.check_status {
            debug!("{} exited with {}", command_line, output.status);
        } else if !output.status.success() {
            if !output.stderr.is_empty() {
                warn!(
                    "{} failed: {}",
                    command_line,
                    String::from_utf8_lossy(&output.stderr).trim_end()
                );
            }
            return Err(Error::StepFailed {
                command: command_line,
                code: output.status.code(),
            });
        }

        debug!("{} produced {} byte(s)", command_line, output.stdout.len());
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn step(argv: &[&str]) -> PipelineStep {
        PipelineStep::new(argv.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_pipe_feeds_previous_output() {
        let out = capture(&step(&["echo", "hi", "|", "tr", "h", "H"])).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Hi\n");
    }

    #[test]
    fn test_inherited_output_step_succeeds() {
        run_step(&step(&["echo", "hi", "|", "tr", "h", "H"])).unwrap();
    }

    #[test]
    fn test_three_stage_pipe() {
        let out = capture(&step(&["printf", "b\\na\\nc\\n", "|", "sort", "|", "head", "-n", "1"])).unwrap();
        assert_eq!(out, b"a\n");
    }

    #[test]
    fn test_env_override_reaches_every_stage() {
        let mut env = BTreeMap::new();
        env.insert("SYSMAN_TEST_VALUE".to_string(), "rebuild".to_string());
        let step = step(&["printenv", "SYSMAN_TEST_VALUE", "|", "tr", "a-z", "A-Z"]).with_env(env);

        let out = capture(&step).unwrap();
        assert_eq!(out, b"REBUILD\n");
    }

    #[test]
    fn test_ambient_environment_is_kept_with_override() {
        let mut env = BTreeMap::new();
        env.insert("SYSMAN_TEST_OTHER".to_string(), "x".to_string());
        // PATH must still be visible for `printenv` to be found at all
        let out = capture(&step(&["printenv", "PATH"]).with_env(env)).unwrap();
        assert!(!out.is_empty());
    }

    #[test]
    fn test_failing_stage_reports_command_and_code() {
        let err = run_step(&step(&["sh", "-c", "exit 3"])).unwrap_err();
        match err {
            Error::StepFailed { command, code } => {
                assert_eq!(command, "sh -c exit 3");
                assert_eq!(code, Some(3));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_failing_first_stage_stops_the_step() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("marker");
        let marker = marker.to_str().unwrap();

        let err = run_step(&step(&["false", "|", "touch", marker])).unwrap_err();
        assert!(matches!(err, Error::StepFailed { ref command, .. } if command == "false"));
        assert!(!std::path::Path::new(marker).exists());
    }

    #[test]
    fn test_pipeline_aborts_after_failed_step() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first");
        let third = dir.path().join("third");

        let steps = vec![
            step(&["touch", first.to_str().unwrap()]),
            step(&["false"]),
            step(&["touch", third.to_str().unwrap()]),
        ];

        let err = run(&steps).unwrap_err();
        assert!(matches!(err, Error::StepFailed { ref command, code: Some(1) } if command == "false"));
        assert!(first.exists());
        assert!(!third.exists());
    }

    #[test]
    fn test_invalid_step_prevents_any_execution() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first");

        let steps = vec![
            step(&["touch", first.to_str().unwrap()]),
            step(&["echo", "hi", "|"]),
        ];

        assert!(matches!(run(&steps), Err(Error::InvalidStep(_))));
        assert!(!first.exists());
    }

    #[test]
    fn test_missing_binary_is_a_spawn_error() {
        let err = run_step(&step(&["sysman-definitely-not-a-command"])).unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[test]
    fn test_query_keeps_output_of_failing_command() {
        let out = query(&step(&["sh", "-c", "echo disabled; exit 1"])).unwrap();
        assert_eq!(out, b"disabled\n");
        assert!(capture(&step(&["sh", "-c", "echo disabled; exit 1"])).is_err());
    }

    #[test]
    fn test_query_still_checks_earlier_stages() {
        let result = query(&step(&["false", "|", "cat"]));
        assert!(matches!(result, Err(Error::StepFailed { .. })));
    }
}
