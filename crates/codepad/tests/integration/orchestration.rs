use std::collections::HashSet;
use std::time::{Duration, Instant};

use codepad::report::{
    INTERNAL_ERROR_MESSAGE, ResponsePayload, STATUS_BAD_REQUEST, STATUS_INTERNAL_ERROR, STATUS_OK,
};
use codepad::runner::{DispatchRequest, ExecutionRequest, RunError, Runner};
use codepad::ExecutionOutcome;

use super::{leftover_entries, shell_config};

fn runner(root: &std::path::Path, timeout: f64) -> Runner {
    Runner::new(shell_config(root, timeout)).expect("runner should build")
}

#[tokio::test]
async fn test_success_cleans_workspace() {
    let root = tempfile::tempdir().unwrap();
    let runner = runner(root.path(), 5.0);

    let outcome = runner
        .execute(ExecutionRequest::new("shell", "echo hi\necho warn >&2\n"))
        .await
        .expect("execution should succeed");

    assert_eq!(
        outcome,
        ExecutionOutcome::Success {
            stdout: "hi\n".to_owned(),
            stderr: "warn\n".to_owned(),
            exit_code: 0,
        }
    );
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_runtime_failure_cleans_workspace() {
    let root = tempfile::tempdir().unwrap();
    let runner = runner(root.path(), 5.0);

    let outcome = runner
        .execute(ExecutionRequest::new("shell", "echo partial\nexit 4\n"))
        .await
        .unwrap();

    match outcome {
        ExecutionOutcome::RuntimeFailed {
            stdout, exit_code, ..
        } => {
            assert_eq!(stdout, "partial\n");
            assert_eq!(exit_code, Some(4));
        }
        other => panic!("expected RuntimeFailed, got {other:?}"),
    }
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_build_failure_surfaces_diagnostics() {
    let root = tempfile::tempdir().unwrap();
    let runner = runner(root.path(), 5.0);

    let outcome = runner
        .execute(ExecutionRequest::new("checked", "if then fi\n"))
        .await
        .unwrap();

    match outcome {
        ExecutionOutcome::BuildFailed { stdout, stderr, .. } => {
            assert!(stdout.is_empty());
            assert!(!stderr.is_empty(), "syntax error should reach stderr");
        }
        other => panic!("expected BuildFailed, got {other:?}"),
    }
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_build_artifacts_are_removed() {
    let root = tempfile::tempdir().unwrap();
    let runner = runner(root.path(), 5.0);

    let outcome = runner
        .execute(ExecutionRequest::new("checked", "echo built\n"))
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_timeout_kills_and_cleans() {
    let root = tempfile::tempdir().unwrap();
    let runner = runner(root.path(), 0.5);

    let started = Instant::now();
    let outcome = runner
        .execute(ExecutionRequest::new(
            "shell",
            "echo partial\nwhile :; do :; done\n",
        ))
        .await
        .unwrap();

    assert_eq!(outcome, ExecutionOutcome::TimedOut);
    // Deadline plus kill grace, with slack for slow machines
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_entry_symbol_names_source_and_run() {
    let root = tempfile::tempdir().unwrap();
    let runner = runner(root.path(), 5.0);
    let script = "# entry: Foo\necho \"$1\"\nbasename \"$0\"\n";

    let outcome = runner
        .execute(ExecutionRequest::new("named", script))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ExecutionOutcome::Success {
            stdout: "Foo\nFoo.sh\n".to_owned(),
            stderr: String::new(),
            exit_code: 0,
        }
    );
}

#[tokio::test]
async fn test_entry_symbol_default() {
    let root = tempfile::tempdir().unwrap();
    let runner = runner(root.path(), 5.0);

    let outcome = runner
        .execute(ExecutionRequest::new("named", "echo \"$1\"\n"))
        .await
        .unwrap();

    match outcome {
        ExecutionOutcome::Success { stdout, .. } => assert_eq!(stdout, "Main\n"),
        other => panic!("expected Success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_preflight_failure_creates_no_workspace() {
    let scratch = tempfile::tempdir().unwrap();
    let root = scratch.path().join("workspaces");
    let runner = runner(&root, 5.0);

    let outcome = runner
        .execute(ExecutionRequest::new("missing", "anything"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ExecutionOutcome::PreflightFailed {
            reason: "compiler is not installed".to_owned(),
            remediation: "install the compiler".to_owned(),
        }
    );
    assert!(!root.exists());
}

#[tokio::test]
async fn test_unsupported_language_creates_no_workspace() {
    let scratch = tempfile::tempdir().unwrap();
    let root = scratch.path().join("workspaces");
    let runner = runner(&root, 5.0);

    let result = runner
        .execute(ExecutionRequest::new("brainfuck", "+++"))
        .await;

    assert!(matches!(result, Err(RunError::NotSupported(_))));
    assert!(!root.exists());
}

#[tokio::test]
async fn test_concurrent_requests_are_isolated() {
    let root = tempfile::tempdir().unwrap();
    let runner = runner(root.path(), 10.0);
    // Each request lists its own directory after a short pause so the runs overlap
    let script = "sleep 0.2\npwd\nls\n";

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let runner = runner.clone();
            tokio::spawn(async move {
                runner
                    .execute(ExecutionRequest::new("shell", script))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut dirs = HashSet::new();
    for task in tasks {
        let outcome = task.await.unwrap();
        let ExecutionOutcome::Success { stdout, .. } = outcome else {
            panic!("expected Success, got {outcome:?}");
        };
        let mut lines = stdout.lines();
        let dir = lines.next().unwrap().to_owned();
        let listing: Vec<_> = lines.collect();
        assert_eq!(listing, vec!["main.sh"], "workspace saw foreign files");
        dirs.insert(dir);
    }

    assert_eq!(dirs.len(), 8);
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_dispatch_success_payload() {
    let root = tempfile::tempdir().unwrap();
    let runner = runner(root.path(), 5.0);

    let response = runner
        .dispatch(DispatchRequest {
            language: "shell".to_owned(),
            code: "echo hi".to_owned(),
        })
        .await;

    assert_eq!(response.status, STATUS_OK);
    assert_eq!(
        response.payload,
        ResponsePayload::Output {
            stdout: "hi\n".to_owned(),
            stderr: String::new(),
        }
    );
}

#[tokio::test]
async fn test_dispatch_json_status_codes() {
    let root = tempfile::tempdir().unwrap();
    let runner = runner(root.path(), 0.5);

    let timed_out = runner
        .dispatch_json(r#"{"language":"shell","code":"sleep 10"}"#)
        .await;
    assert_eq!(timed_out.status, STATUS_OK);
    assert_eq!(
        timed_out.body_json().unwrap(),
        r#"{"error":"Execution timed out"}"#
    );

    let preflight = runner
        .dispatch_json(r#"{"language":"missing","code":""}"#)
        .await;
    assert_eq!(preflight.status, STATUS_INTERNAL_ERROR);

    let unsupported = runner
        .dispatch_json(r#"{"language":"cobol","code":""}"#)
        .await;
    assert_eq!(unsupported.status, STATUS_BAD_REQUEST);
}

#[tokio::test]
async fn test_internal_error_is_generic_and_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let runner = runner(root.path(), 5.0);

    let result = runner
        .execute(ExecutionRequest::new("broken", "anything"))
        .await;
    assert!(matches!(result, Err(RunError::Executor(_))));
    assert_eq!(leftover_entries(root.path()), 0);

    let response = runner
        .dispatch_json(r#"{"language":"broken","code":"anything"}"#)
        .await;
    assert_eq!(response.status, STATUS_INTERNAL_ERROR);
    assert_eq!(
        response.payload,
        ResponsePayload::Error {
            error: INTERNAL_ERROR_MESSAGE.to_owned(),
            remediation: None,
        }
    );
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_dropped_dispatch_runs_to_completion() {
    let root = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let marker = scratch.path().join("finished");
    let runner = runner(root.path(), 5.0);

    // Give up waiting before the program finishes, like a disconnected client
    let request = DispatchRequest {
        language: "shell".to_owned(),
        code: format!("sleep 0.5\ntouch '{}'\n", marker.display()),
    };
    let abandoned =
        tokio::time::timeout(Duration::from_millis(100), runner.dispatch(request)).await;
    assert!(abandoned.is_err());
    assert!(!marker.exists());

    // The spawned execution keeps going, finishes the program and cleans up
    let mut finished = false;
    for _ in 0..50 {
        if marker.exists() && leftover_entries(root.path()) == 0 {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(marker.exists(), "execution was cancelled with the caller");
    assert!(finished, "workspace was not removed");
}
