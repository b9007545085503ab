use super::*;
use std::time::Duration;
use tokio::process::Command;

#[tokio::test]
async fn completed_subprocess_returns_its_output() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "exit 0"]);
    let cancel = CancellationToken::new();

    let output = run_killable(cmd, &cancel).await.unwrap();
    assert!(output.status.success());
}

#[tokio::test]
async fn cancellation_kills_the_subprocess_promptly() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "sleep 30"]);
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_clone.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(5), run_killable(cmd, &cancel)).await;
    assert!(matches!(result, Ok(Err(KillError::Cancelled))));
}
