use async_trait::async_trait;
use ideanodes::{
    AppError, AppResult, Caller, ClientState, ExportFormat, ExportedNode, JobStatus, ModelProvider, ModelRequest,
    NodeKind, OutputSchema, RunnerCore,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Answers each schema with the next canned reply for that schema.
struct CannedProvider {
    nodes: Mutex<VecDeque<&'static str>>,
    lists: Mutex<VecDeque<&'static str>>,
}

impl CannedProvider {
    fn new(nodes: &[&'static str], lists: &[&'static str]) -> Self {
        Self {
            nodes: Mutex::new(nodes.iter().copied().collect()),
            lists: Mutex::new(lists.iter().copied().collect()),
        }
    }
}

#[async_trait]
impl ModelProvider for CannedProvider {
    fn name(&self) -> &'static str {
        "canned"
    }

    async fn generate(&self, request: &ModelRequest) -> AppResult<String> {
        let queue = match request.schema {
            OutputSchema::Node => &self.nodes,
            OutputSchema::NodeList => &self.lists,
            OutputSchema::Title => return Ok(r#"{"title":"Auto Title"}"#.to_string()),
        };
        queue
            .lock()
            .expect("queue lock")
            .pop_front()
            .map(ToString::to_string)
            .ok_or_else(|| AppError::Provider("out of replies".to_string()))
    }
}

#[tokio::test]
async fn signed_in_user_builds_remixes_and_exports_a_chain() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(CannedProvider::new(
        &[r#"{"title":"Solution","content":"Capture runoff in barrels"}"#],
        &[
            r#"[{"title":"Problem","content":"Gardens dry out"},{"title":"Idea","content":"Store rain"}]"#,
            r#"[{"title":"Soil","content":"a"},{"title":"Beds","content":"b"},{"title":"Harvest","content":"c"}]"#,
        ],
    ));
    let runner = RunnerCore::new(dir.path().to_path_buf(), provider).expect("runner");
    runner.start_scheduler();

    let mut client = ClientState::new(runner.clone(), Caller::user("gardener"));
    client.sync_sessions().expect("sync");
    let original = client.active_session_id().expect("session").to_string();

    client
        .import_text("Gardens dry out every summer. We could store rain.")
        .await
        .expect("import");
    let status = client.wait_for_job().await.expect("wait").expect("job");
    assert!(matches!(status, JobStatus::Completed { .. }));

    client.generate_next().await.expect("generate");
    client.wait_for_job().await.expect("wait");
    let nodes = client.nodes().expect("nodes");
    let kinds = nodes.iter().map(|node| node.kind).collect::<Vec<_>>();
    assert_eq!(kinds, vec![NodeKind::Initial, NodeKind::User, NodeKind::Expansion]);

    client.remix("Gardening").await.expect("remix");
    let remix_session = client.active_session_id().expect("remix session").to_string();
    assert_ne!(remix_session, original);
    client.wait_for_job().await.expect("wait");
    assert_eq!(client.nodes().expect("remixed").len(), 3);
    assert_eq!(runner.list_nodes(&original).expect("original").len(), 3);

    let json = client.export(ExportFormat::Json).expect("export");
    let parsed: Vec<ExportedNode> = serde_json::from_str(&json).expect("parse export");
    let titles = parsed.iter().map(|node| node.title.as_str()).collect::<Vec<_>>();
    assert_eq!(titles, vec!["Soil", "Beds", "Harvest"]);

    let written = runner
        .export_session(&Caller::user("gardener"), &original, "markdown")
        .expect("export file");
    let markdown = std::fs::read_to_string(written.path).expect("read");
    assert!(markdown.starts_with("## Problem\n\nGardens dry out\n"));
    assert_eq!(markdown.matches("\n---\n\n").count(), 2);

    assert!(client.delete_session(&remix_session).expect("delete"));
    assert!(runner.list_nodes(&remix_session).expect("nodes").is_empty());
}

#[tokio::test]
async fn another_user_cannot_touch_a_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = RunnerCore::new(dir.path().to_path_buf(), Arc::new(CannedProvider::new(&[], &[]))).expect("runner");
    runner.start_scheduler();

    let owner = Caller::user("owner");
    let session = runner.create_session(&owner, Some("Private")).expect("session");
    let stranger = Caller::user("stranger");

    assert!(matches!(
        runner.start_generate_next(&stranger, &session.id).await,
        Err(AppError::Unauthorized(_))
    ));
    assert!(matches!(
        runner.delete_session(&stranger, &session.id),
        Err(AppError::Unauthorized(_))
    ));
    assert!(runner.list_sessions(&stranger, None).expect("list").is_empty());
    assert_eq!(runner.list_sessions(&owner, None).expect("list").len(), 1);
}
