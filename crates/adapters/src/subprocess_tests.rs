use super::*;

#[tokio::test]
async fn fake_records_sling_invocation() {
    let runner = FakeCliRunner::new();
    runner.sling("gt-abc", "gt", false, Some("claude-a")).await.unwrap();
    assert_eq!(
        runner.state().slung,
        vec![("gt-abc".to_string(), "gt".to_string(), false, Some("claude-a".to_string()))]
    );
}

#[tokio::test]
async fn fake_convoy_stranded_returns_preloaded_set() {
    let runner = FakeCliRunner::new();
    runner.set_stranded(vec![StrandedConvoy {
        id: "hq-cv-1".to_string(),
        ready_count: 2,
        ready_issues: vec!["gt-a".to_string(), "gt-b".to_string()],
    }]);
    let stranded = runner.convoy_stranded().await.unwrap();
    assert_eq!(stranded.len(), 1);
    assert_eq!(stranded[0].ready_count, 2);
}

