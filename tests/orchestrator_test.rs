mod common;

use common::{
    test_config, wait_until, FailingSink, FlakyTaskRepository, GatedParaphraser, RecordingSink,
    ScriptedParaphraser,
};
use paraphrase_rewrite::infrastructure::{InMemoryDocumentStore, InMemoryVersionStore};
use paraphrase_rewrite::models::RewriteJob;
use paraphrase_rewrite::{
    App, Config, Document, MatchStatus, Paraphraser, ProcessOutcome, RewriteError, Stores,
    TaskOrchestrator, TaskStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

const SOURCE: &str = "thesis.json";

fn ten_sentences() -> Vec<String> {
    (0..10)
        .map(|i| format!("Sentence number {} of the thesis.", i))
        .collect()
}

fn stores_with(doc: Document) -> Stores {
    Stores::in_memory(Arc::new(InMemoryDocumentStore::new().with_document(SOURCE, doc)))
}

fn orchestrator(paraphraser: Arc<ScriptedParaphraser>, stores: Stores) -> TaskOrchestrator {
    TaskOrchestrator::new(&test_config(), paraphraser, stores)
}

fn config_with_widths(tasks: usize, fragments: usize) -> Config {
    Config {
        max_concurrent_tasks: tasks,
        max_concurrent_fragments: fragments,
        ..test_config()
    }
}

/// 任务记录放在会按次数失败的仓库里
fn flaky_stores(doc: Document, fail_on: impl IntoIterator<Item = usize>) -> Stores {
    Stores {
        tasks: Arc::new(FlakyTaskRepository::failing_on(fail_on)),
        versions: Arc::new(InMemoryVersionStore::new()),
        documents: Arc::new(InMemoryDocumentStore::new().with_document(SOURCE, doc)),
    }
}

async fn new_task<I, S>(orch: &TaskOrchestrator, fragments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let task_id = orch.create_task(SOURCE).await.unwrap();
    orch.attach_fragments(&task_id, fragments).await.unwrap();
    task_id
}

#[tokio::test]
async fn scenario_d_quota_pause_and_resume() {
    let sentences = ten_sentences();
    let stores = stores_with(Document::from_paragraphs(sentences.clone()));
    // 第 7 次调用（序号 6）配额耗尽
    let paraphraser = Arc::new(ScriptedParaphraser::new().quota_on_call(6));
    let orch = orchestrator(paraphraser.clone(), stores.clone());

    let task_id = assert_ok!(orch.create_task(SOURCE).await);
    assert_eq!(assert_ok!(orch.attach_fragments(&task_id, sentences.clone()).await), 10);

    let outcome = assert_ok!(orch.process(&task_id, None).await);
    assert_eq!(outcome, ProcessOutcome::QuotaPaused { processed_count: 6 });
    assert_eq!(paraphraser.calls(), 7);

    let task = stores.tasks.load(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::QuotaPaused);
    assert_eq!(task.processed_count, 6);
    assert!(task.paraphrased[..6].iter().all(Option::is_some));
    assert!(task.paraphrased[6..].iter().all(Option::is_none));
    assert!(task.result_ref.is_none());

    // 再次处理只派发空槽位
    paraphraser.clear_seen();
    let outcome = assert_ok!(orch.process(&task_id, None).await);
    let result_ref = match outcome {
        ProcessOutcome::Completed { result_ref } => result_ref,
        other => panic!("期望 Completed，实际为 {:?}", other),
    };
    assert_eq!(paraphraser.seen(), sentences[6..].to_vec());
    assert_eq!(paraphraser.calls(), 11);

    let doc = stores.documents.load(&result_ref).await.unwrap();
    let expected: Vec<String> = sentences.iter().map(|s| format!("{} [改写]", s)).collect();
    assert_eq!(doc.plain_text(), expected.join("\n"));

    let status = assert_ok!(orch.task_status(&task_id).await);
    assert_eq!(status.status, TaskStatus::Completed);
    assert_eq!(status.processed_count, 10);
    assert!(status.completed_at.is_some());
}

#[tokio::test]
async fn scenario_e_continuation_builds_next_version_from_original() {
    let source = Document::from_paragraphs([
        "Alpha sentence one.",
        "Beta sentence two.",
        "Gamma sentence three.",
    ]);
    let stores = stores_with(source.clone());
    let paraphraser = Arc::new(
        ScriptedParaphraser::new()
            .reply("Alpha sentence one.", "First rewritten.")
            .reply("Beta sentence two.", "Second rewritten.")
            .reply("Gamma sentence three.", "Third rewritten."),
    );
    let orch = orchestrator(paraphraser.clone(), stores.clone());

    let session_id = assert_ok!(orch.create_task(SOURCE).await);
    assert_ok!(
        orch.attach_fragments(&session_id, ["Alpha sentence one.", "Beta sentence two."])
            .await
    );
    let first = assert_ok!(orch.process(&session_id, None).await);
    assert!(matches!(first, ProcessOutcome::Completed { .. }));

    let v1 = stores.versions.load(&session_id).await.unwrap().unwrap();
    assert_eq!(v1.version_number, 1);
    assert_eq!(v1.fragment_history.len(), 2);

    let run = assert_ok!(
        orch.continue_task(&session_id, ["Gamma sentence three."], None)
            .await
    );
    assert_ne!(run.task_id, session_id);
    let result_ref = match run.outcome {
        ProcessOutcome::Completed { result_ref } => result_ref,
        other => panic!("期望 Completed，实际为 {:?}", other),
    };

    // 历史片段不会重新派发
    assert_eq!(paraphraser.calls(), 3);

    let v2 = stores.versions.load(&session_id).await.unwrap().unwrap();
    assert_eq!(v2.version_number, 2);
    assert_eq!(v2.original_source_ref, SOURCE);
    assert_eq!(v2.result_ref, result_ref);
    assert_eq!(v2.fragment_history.len(), 3);
    assert!(v2
        .fragment_history
        .iter()
        .all(|f| f.match_status == MatchStatus::Exact));

    let doc = stores.documents.load(&result_ref).await.unwrap();
    assert_eq!(
        doc.plain_text(),
        "First rewritten.\nSecond rewritten.\nThird rewritten."
    );

    let task = stores.tasks.load(&run.task_id).await.unwrap().unwrap();
    assert_eq!(task.session_id, session_id);
    assert_eq!(task.metadata["rewrite_report"]["replaced_count"], 3);
    assert_eq!(task.metadata["version_number"], 2);

    // 原始文档保持不变
    assert_eq!(stores.documents.load(SOURCE).await.unwrap(), source);
}

#[tokio::test]
async fn completed_task_returns_existing_result_without_calls() {
    let stores = stores_with(Document::from_paragraphs(["Only one sentence."]));
    let paraphraser = Arc::new(ScriptedParaphraser::new());
    let orch = orchestrator(paraphraser.clone(), stores);

    let task_id = assert_ok!(orch.create_task(SOURCE).await);
    assert_ok!(orch.attach_fragments(&task_id, ["Only one sentence."]).await);

    let first = assert_ok!(orch.process(&task_id, None).await);
    let second = assert_ok!(orch.process(&task_id, None).await);
    assert_eq!(first, second);
    assert_eq!(paraphraser.calls(), 1);

    // 完成后不再接受新片段
    let err = orch
        .attach_fragments(&task_id, ["More text."])
        .await
        .unwrap_err();
    assert!(matches!(err, RewriteError::Validation(_)));
}

#[tokio::test]
async fn failing_sink_does_not_affect_processing() {
    let sentences = ten_sentences();
    let stores = stores_with(Document::from_paragraphs(sentences.clone()));
    let orch = orchestrator(Arc::new(ScriptedParaphraser::new()), stores);

    let task_id = assert_ok!(orch.create_task(SOURCE).await);
    assert_ok!(orch.attach_fragments(&task_id, sentences).await);

    let outcome = assert_ok!(orch.process(&task_id, Some(&FailingSink)).await);
    assert!(matches!(outcome, ProcessOutcome::Completed { .. }));
}

#[tokio::test]
async fn progress_is_reported_to_sink() {
    let sentences = ten_sentences();
    let stores = stores_with(Document::from_paragraphs(sentences.clone()));
    let orch = orchestrator(Arc::new(ScriptedParaphraser::new()), stores);
    let sink = RecordingSink::default();

    let task_id = assert_ok!(orch.create_task(SOURCE).await);
    assert_ok!(orch.attach_fragments(&task_id, sentences).await);
    assert_ok!(orch.process(&task_id, Some(&sink)).await);

    let messages = sink.messages.lock().unwrap().clone();
    assert!(messages.iter().any(|m| m.contains("10/10")));
    assert!(messages.last().unwrap().contains("文档已生成"));
}

#[tokio::test]
async fn permanent_failure_marks_task_failed_and_can_be_retried() {
    let stores = stores_with(Document::from_paragraphs(["Good one.", "Bad one."]));
    let paraphraser = Arc::new(ScriptedParaphraser::new().fatal_on("Bad one."));
    let orch = orchestrator(paraphraser, stores.clone());

    let task_id = assert_ok!(orch.create_task(SOURCE).await);
    assert_ok!(orch.attach_fragments(&task_id, ["Good one.", "Bad one."]).await);

    let outcome = assert_ok!(orch.process(&task_id, None).await);
    let error = match outcome {
        ProcessOutcome::Failed { error } => error,
        other => panic!("期望 Failed，实际为 {:?}", other),
    };
    assert!(!error.is_empty());
    assert!(error.chars().count() <= 500);

    let task = stores.tasks.load(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some(error.as_str()));
    assert_eq!(task.paraphrased[0].as_deref(), Some("Good one. [改写]"));
    assert!(task.paraphrased[1].is_none());

    // 换一个正常的改写服务重新处理，只派发失败的槽位
    let healthy = Arc::new(ScriptedParaphraser::new());
    let orch = orchestrator(healthy.clone(), stores);
    let outcome = assert_ok!(orch.process(&task_id, None).await);
    assert!(matches!(outcome, ProcessOutcome::Completed { .. }));
    assert_eq!(healthy.seen(), vec!["Bad one.".to_string()]);
}

#[tokio::test]
async fn unknown_task_and_empty_task_are_rejected() {
    let orch = orchestrator(
        Arc::new(ScriptedParaphraser::new()),
        stores_with(Document::default()),
    );

    let err = orch.process("no-such-task", None).await.unwrap_err();
    assert!(matches!(err, RewriteError::NotFound(_)));

    let err = orch
        .continue_task("no-such-session", ["x"], None)
        .await
        .unwrap_err();
    assert!(matches!(err, RewriteError::NotFound(_)));

    let task_id = assert_ok!(orch.create_task(SOURCE).await);
    let err = orch.process(&task_id, None).await.unwrap_err();
    assert!(matches!(err, RewriteError::Validation(_)));
}

#[tokio::test]
async fn missing_source_document_fails_the_task() {
    let orch = orchestrator(
        Arc::new(ScriptedParaphraser::new()),
        Stores::in_memory(Arc::new(InMemoryDocumentStore::new())),
    );

    let task_id = assert_ok!(orch.create_task("missing.json").await);
    assert_ok!(orch.attach_fragments(&task_id, ["Some text."]).await);

    let outcome = assert_ok!(orch.process(&task_id, None).await);
    assert!(matches!(outcome, ProcessOutcome::Failed { .. }));
}

#[tokio::test]
async fn cleanup_removes_the_task() {
    let orch = orchestrator(
        Arc::new(ScriptedParaphraser::new()),
        stores_with(Document::default()),
    );
    let task_id = assert_ok!(orch.create_task(SOURCE).await);

    assert!(assert_ok!(orch.cleanup_task(&task_id).await));
    assert!(!assert_ok!(orch.cleanup_task(&task_id).await));
    assert!(matches!(
        orch.task_status(&task_id).await,
        Err(RewriteError::NotFound(_))
    ));
}

#[tokio::test]
async fn paused_task_resumes_after_restart_with_json_stores() {
    let dir = tempfile::tempdir().unwrap();
    let sentences = ten_sentences();

    let stores = Stores::json(dir.path());
    let source_ref = stores
        .documents
        .save(&Document::from_paragraphs(sentences.clone()), "thesis")
        .await
        .unwrap();

    let task_id = {
        let orch = orchestrator(
            Arc::new(ScriptedParaphraser::new().quota_on_call(3)),
            stores,
        );
        let task_id = assert_ok!(orch.create_task(&source_ref).await);
        assert_ok!(orch.attach_fragments(&task_id, sentences.clone()).await);
        let outcome = assert_ok!(orch.process(&task_id, None).await);
        assert_eq!(outcome, ProcessOutcome::QuotaPaused { processed_count: 3 });
        task_id
    };

    // 模拟进程重启：全新的编排器读取同一目录
    let resumed = Arc::new(ScriptedParaphraser::new());
    let orch = orchestrator(resumed.clone(), Stores::json(dir.path()));
    let outcome = assert_ok!(orch.process(&task_id, None).await);
    let result_ref = match outcome {
        ProcessOutcome::Completed { result_ref } => result_ref,
        other => panic!("期望 Completed，实际为 {:?}", other),
    };
    assert_eq!(resumed.calls(), 7);
    assert!(result_ref.starts_with("thesis_"));
    assert!(result_ref.contains("_v1_"));

    let doc = orch.stores().documents.load(&result_ref).await.unwrap();
    assert!(doc.plain_text().contains("Sentence number 9 of the thesis. [改写]"));
}

#[tokio::test]
async fn app_processes_a_batch_of_jobs() {
    let stores = stores_with(Document::from_paragraphs(["First text.", "Second text."]));
    let app = App::with_parts(test_config(), Arc::new(ScriptedParaphraser::new()), stores);

    let jobs = vec![
        RewriteJob {
            source: SOURCE.to_string(),
            session: None,
            fragments: vec!["First text.".to_string()],
            file_path: Some("jobs/first.toml".to_string()),
        },
        RewriteJob {
            source: "missing.json".to_string(),
            session: None,
            fragments: vec!["Second text.".to_string()],
            file_path: None,
        },
    ];

    let stats = app.process_all_jobs(jobs).await;
    assert_eq!(stats.total, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.paused, 0);
}

#[tokio::test]
async fn attach_is_rejected_while_task_waits_for_the_task_gate() {
    let stores = stores_with(Document::from_paragraphs(["One.", "Two.", "Three."]));
    let paraphraser = Arc::new(GatedParaphraser::closed());
    let orch = Arc::new(TaskOrchestrator::new(
        &config_with_widths(1, 1),
        paraphraser.clone(),
        stores.clone(),
    ));

    let first = new_task(&orch, ["One."]).await;
    let second = new_task(&orch, ["Two."]).await;

    // 第一个任务占住唯一的任务许可，卡在改写调用中
    let first_run = tokio::spawn({
        let orch = orch.clone();
        async move { orch.process(&first, None).await }
    });
    wait_until(|| paraphraser.started() == 1).await;

    // 第二个任务在任务闸门前排队
    let second_run = tokio::spawn({
        let orch = orch.clone();
        let second = second.clone();
        async move { orch.process(&second, None).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(paraphraser.started(), 1);

    let err = orch
        .attach_fragments(&second, ["Three."])
        .await
        .unwrap_err();
    assert!(matches!(err, RewriteError::Validation(_)));

    paraphraser.release();
    let first_outcome = assert_ok!(first_run.await.unwrap());
    let second_outcome = assert_ok!(second_run.await.unwrap());
    assert!(matches!(first_outcome, ProcessOutcome::Completed { .. }));
    assert!(matches!(second_outcome, ProcessOutcome::Completed { .. }));

    let task = stores.tasks.load(&second).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.fragments.len(), 1);
    assert_eq!(task.paraphrased.len(), 1);
}

#[tokio::test]
async fn checkpoint_save_failure_marks_task_failed() {
    let sentences = ten_sentences();
    // 第 1 次保存：创建；第 2 次：追加片段；第 3 次：Processing；第 4 次：第一个检查点
    let stores = flaky_stores(Document::from_paragraphs(sentences[..3].to_vec()), [4]);
    let orch = orchestrator(Arc::new(ScriptedParaphraser::new()), stores.clone());

    let task_id = new_task(&orch, sentences[..3].to_vec()).await;
    let outcome = assert_ok!(orch.process(&task_id, None).await);
    let error = match outcome {
        ProcessOutcome::Failed { error } => error,
        other => panic!("期望 Failed，实际为 {:?}", other),
    };
    assert!(error.contains("disk full"));

    let task = stores.tasks.load(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some(error.as_str()));
    assert!(task.result_ref.is_none());

    // 仓库恢复后重新处理，补齐剩余槽位
    let outcome = assert_ok!(orch.process(&task_id, None).await);
    assert!(matches!(outcome, ProcessOutcome::Completed { .. }));
    let task = stores.tasks.load(&task_id).await.unwrap().unwrap();
    assert!(task.is_fully_paraphrased());
}

#[tokio::test]
async fn failed_final_save_does_not_bump_version_twice() {
    // 创建、追加、Processing、检查点、结果文档已生成，第 6 次是 Completed
    let stores = flaky_stores(Document::from_paragraphs(["Only one sentence."]), [6]);
    let paraphraser = Arc::new(ScriptedParaphraser::new());
    let orch = orchestrator(paraphraser.clone(), stores.clone());

    let task_id = new_task(&orch, ["Only one sentence."]).await;
    let outcome = assert_ok!(orch.process(&task_id, None).await);
    assert!(matches!(outcome, ProcessOutcome::Failed { .. }));

    let v1 = stores.versions.load(&task_id).await.unwrap().unwrap();
    assert_eq!(v1.version_number, 1);
    let task = stores.tasks.load(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.result_ref.as_deref(), Some(v1.result_ref.as_str()));

    let outcome = assert_ok!(orch.process(&task_id, None).await);
    assert_eq!(
        outcome,
        ProcessOutcome::Completed {
            result_ref: v1.result_ref.clone()
        }
    );
    assert_eq!(paraphraser.calls(), 1);

    let version = stores.versions.load(&task_id).await.unwrap().unwrap();
    assert_eq!(version.version_number, 1);
    let task = stores.tasks.load(&task_id).await.unwrap().unwrap();
    assert_eq!(task.metadata["version_number"], 1);
    assert_eq!(task.metadata["rewrite_report"]["replaced_count"], 1);
}

#[tokio::test]
async fn fragment_gate_bounds_in_flight_calls() {
    let sentences = ten_sentences();
    let stores = stores_with(Document::from_paragraphs(sentences.clone()));
    let paraphraser = Arc::new(GatedParaphraser::open(Duration::from_millis(50)));
    let orch = TaskOrchestrator::new(&config_with_widths(2, 3), paraphraser.clone(), stores);

    let task_id = new_task(&orch, sentences).await;
    let outcome = assert_ok!(orch.process(&task_id, None).await);

    assert!(matches!(outcome, ProcessOutcome::Completed { .. }));
    assert_eq!(paraphraser.started(), 10);
    assert_eq!(paraphraser.peak(), 3);
}

#[tokio::test]
async fn task_gate_serialises_tasks() {
    let sentences = ten_sentences();
    let stores = stores_with(Document::from_paragraphs(sentences.clone()));
    let paraphraser = Arc::new(GatedParaphraser::open(Duration::from_millis(30)));
    let orch = TaskOrchestrator::new(&config_with_widths(1, 3), paraphraser.clone(), stores);

    let first = new_task(&orch, sentences[..3].to_vec()).await;
    let second = new_task(&orch, sentences[3..6].to_vec()).await;

    let (a, b) = tokio::join!(orch.process(&first, None), orch.process(&second, None));
    assert!(matches!(assert_ok!(a), ProcessOutcome::Completed { .. }));
    assert!(matches!(assert_ok!(b), ProcessOutcome::Completed { .. }));

    // 两个任务同时处理时峰值会超过单个任务的片段并发数
    assert_eq!(paraphraser.started(), 6);
    assert!(paraphraser.peak() <= 3, "peak = {}", paraphraser.peak());
}

#[tokio::test]
async fn quota_drains_in_flight_calls_at_wider_gate() {
    let sentences = ten_sentences();
    let stores = stores_with(Document::from_paragraphs(sentences.clone()));
    let paraphraser = Arc::new(ScriptedParaphraser::new().quota_on_call(6));
    let orch = TaskOrchestrator::new(
        &config_with_widths(1, 3),
        paraphraser.clone() as Arc<dyn Paraphraser>,
        stores.clone(),
    );

    let task_id = new_task(&orch, sentences.clone()).await;
    let processed = match assert_ok!(orch.process(&task_id, None).await) {
        ProcessOutcome::QuotaPaused { processed_count } => processed_count,
        other => panic!("期望 QuotaPaused，实际为 {:?}", other),
    };

    // 除了配额耗尽的那一次，已派发的调用都完成并保留了结果
    assert!(processed >= 6);
    assert_eq!(paraphraser.calls(), processed + 1);
    let task = stores.tasks.load(&task_id).await.unwrap().unwrap();
    assert_eq!(task.filled_count(), processed);
    assert_eq!(task.processed_count, processed);

    let mut missing: Vec<String> = task
        .pending_indices()
        .into_iter()
        .map(|i| sentences[i].clone())
        .collect();

    paraphraser.clear_seen();
    let outcome = assert_ok!(orch.process(&task_id, None).await);
    assert!(matches!(outcome, ProcessOutcome::Completed { .. }));

    let mut resumed = paraphraser.seen();
    resumed.sort();
    missing.sort();
    assert_eq!(resumed, missing);
    assert_eq!(paraphraser.calls(), 11);
}
