//! End-to-end runs against real processes.

use std::io::Cursor;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use proc_relay::config::RunnerConfig;
use proc_relay::process::SpawnError;
use proc_relay::runner::{ProcessRunner, RunError};

fn runner(config: RunnerConfig) -> ProcessRunner {
    ProcessRunner::new(config.with_exit_grace_ms(500))
}

#[tokio::test]
async fn echo_yields_output_then_clean_end() {
    let runner = runner(RunnerConfig::default().with_timeout_secs(5));

    let mut output = runner
        .run_and_read_output("echo", ["hi"], CancellationToken::new())
        .await
        .unwrap();

    let mut data = Vec::new();
    output.read_to_end(&mut data).await.unwrap();
    assert_eq!(data, b"hi\n");
    output.close().await;
}

#[tokio::test]
async fn nonzero_exit_reports_code_and_stderr() {
    let runner = runner(RunnerConfig::default().with_timeout_secs(5));

    let mut output = runner
        .run_and_read_output(
            "sh",
            ["-c", "printf 'bad arg' >&2; exit 2"],
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let mut data = Vec::new();
    let err = output.read_to_end(&mut data).await.unwrap_err();
    let run_err = RunError::from_io(&err).unwrap();
    assert_eq!(run_err.exit_code(), Some(2));
    assert_eq!(run_err.message(), Some("bad arg"));
}

#[tokio::test]
async fn cancellation_kills_sleeping_process() {
    let runner = runner(RunnerConfig::default());
    let cancel = CancellationToken::new();

    let mut output = runner
        .run_and_read_output("sleep", ["10"], cancel.clone())
        .await
        .unwrap();

    let started = Instant::now();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let mut data = Vec::new();
    let err = output.read_to_end(&mut data).await.unwrap_err();
    assert!(matches!(RunError::from_io(&err), Some(RunError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn cancellation_kills_whole_process_tree() {
    let runner = runner(RunnerConfig::default());
    let cancel = CancellationToken::new();

    // The background sleep keeps stdout open unless it is killed too.
    let mut output = runner
        .run_and_read_output("sh", ["-c", "sleep 30 & sleep 30"], cancel.clone())
        .await
        .unwrap();

    let started = Instant::now();
    cancel.cancel();

    let mut data = Vec::new();
    let err = output.read_to_end(&mut data).await.unwrap_err();
    assert!(matches!(RunError::from_io(&err), Some(RunError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn cancellation_kills_group_left_by_exited_shell() {
    let runner = runner(RunnerConfig::default());
    let cancel = CancellationToken::new();

    // The shell exits at once; its background sleep inherits stdout.
    let mut output = runner
        .run_and_read_output("sh", ["-c", "sleep 30 & exit 0"], cancel.clone())
        .await
        .unwrap();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let mut data = Vec::new();
    let err = output.read_to_end(&mut data).await.unwrap_err();
    assert!(matches!(RunError::from_io(&err), Some(RunError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn early_close_kills_group_left_by_exited_shell() {
    let runner = runner(RunnerConfig::default());

    let output = runner
        .run_and_read_output("sh", ["-c", "sleep 30 & exit 0"], CancellationToken::new())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let started = Instant::now();
    output.close().await;
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn timeout_kills_long_running_process() {
    let runner = runner(RunnerConfig::default().with_timeout_secs(1));

    let mut output = runner
        .run_and_read_output("sleep", ["10"], CancellationToken::new())
        .await
        .unwrap();

    let started = Instant::now();
    let mut data = Vec::new();
    let err = output.read_to_end(&mut data).await.unwrap_err();
    assert!(matches!(
        RunError::from_io(&err),
        Some(RunError::TimedOut { .. })
    ));
    assert!(started.elapsed() < Duration::from_secs(8));
}

#[tokio::test]
async fn input_is_piped_through_cat() {
    let runner = runner(RunnerConfig::default().with_timeout_secs(5));

    let mut output = runner
        .run_and_read_output_with_input(
            "cat",
            std::iter::empty::<&str>(),
            Cursor::new(b"round the pipe".to_vec()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let mut data = String::new();
    output.read_to_string(&mut data).await.unwrap();
    assert_eq!(data, "round the pipe");
}

#[tokio::test]
async fn large_output_streams_completely() {
    let runner = runner(RunnerConfig::default().with_timeout_secs(10));

    // Also writes to stderr so a full stderr pipe would stall the process.
    let mut output = runner
        .run_and_read_output(
            "sh",
            ["-c", "i=0; while [ $i -lt 2000 ]; do echo line-$i; echo progress-$i >&2; i=$((i+1)); done"],
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let mut data = String::new();
    output.read_to_string(&mut data).await.unwrap();
    assert_eq!(data.lines().count(), 2000);
    assert_eq!(data.lines().last(), Some("line-1999"));
}

#[tokio::test]
async fn close_mid_stream_is_quiet() {
    let runner = runner(RunnerConfig::default());

    let mut output = runner
        .run_and_read_output("sh", ["-c", "echo first; sleep 30"], CancellationToken::new())
        .await
        .unwrap();

    let mut buf = [0u8; 6];
    output.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"first\n");

    let started = Instant::now();
    output.close().await;
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn missing_executable_fails_to_start() {
    let runner = runner(RunnerConfig::default());

    let result = runner
        .run_and_read_output(
            "/nonexistent/proc-relay-missing",
            ["a"],
            CancellationToken::new(),
        )
        .await;
    assert!(matches!(
        result,
        Err(RunError::Spawn(SpawnError::NotFound(_)))
    ));
}

#[tokio::test]
async fn sigint_exit_is_cancellation() {
    let runner = runner(RunnerConfig::default().with_interrupt_exit_code(Some(130)));

    let mut output = runner
        .run_and_read_output("sh", ["-c", "kill -INT $$"], CancellationToken::new())
        .await
        .unwrap();

    let mut data = Vec::new();
    let err = output.read_to_end(&mut data).await.unwrap_err();
    assert!(matches!(RunError::from_io(&err), Some(RunError::Cancelled)));
}
