use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use rubric_grader::error::ValidationError;
use rubric_grader::models::{
    AggregateScore, CorrectionReport, CriterionId, DegradedKind, Heuristic, RiskFlagToggle,
};
use rubric_grader::services::ResultWriter;
use rubric_grader::{
    AppError, AppResult, Config, GradingEngine, OverrideRecord, PageInput, ScoringModel,
    ScoringRequest, SubmissionInput,
};

/// 按页面文本中的标记返回固定响应的模型
///
/// - `[[cover]]`：跳过页
/// - `[[hang]]`：永不返回
/// - `[[vq=N]]`：violation_quality 为 N，其他项满分
/// - `[[trunc]]`：在 feedback 中间截断
#[derive(Default)]
struct MarkerModel {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl MarkerModel {
    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn respond(prompt: &str) -> String {
        if prompt.contains("[[cover]]") {
            return r#"{"skip_analysis": true, "skip_reason": "cover page"}"#.to_string();
        }

        let page = marker_number(prompt, "STUDENT SUBMISSION - PAGE ").unwrap_or(1);
        let vq = marker_number(prompt, "[[vq=").unwrap_or(20);
        let heuristic = (page - 1) % 10 + 1;
        let json = content_json(vq, heuristic);

        if prompt.contains("[[trunc]]") {
            let cut = json.find("clear evidence").unwrap_or(json.len());
            return json[..cut].to_string();
        }
        json
    }
}

impl ScoringModel for MarkerModel {
    fn model_name(&self) -> &str {
        "marker-model"
    }

    fn score_page<'a>(&'a self, request: &'a ScoringRequest) -> BoxFuture<'a, AppResult<String>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if request.prompt.contains("[[hang]]") {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            } else {
                tokio::time::sleep(Duration::from_millis(30)).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Self::respond(&request.prompt))
        })
    }
}

fn marker_number(text: &str, prefix: &str) -> Option<u32> {
    let rest = text.split(prefix).nth(1)?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn content_json(vq: u32, heuristic: u32) -> String {
    format!(
        r#"{{"skip_analysis": false, "skip_reason": "", "page_type": "heuristic violation analysis", "extracted_violations": [{{"heuristic_num": {heuristic}, "heuristic_name": "", "description": "issue found", "severity": "Major"}}], "score_breakdown": {{"coverage": {{"points": null, "max": 15, "comment": ""}}, "violation_quality": {{"points": {vq}, "max": 20, "comment": ""}}, "screenshots": {{"points": 10, "max": 10, "comment": ""}}, "severity_analysis": {{"points": 10, "max": 10, "comment": ""}}, "structure_navigation": {{"points": 10, "max": 10, "comment": ""}}, "professional_quality": {{"points": 10, "max": 10, "comment": ""}}, "writing_quality": {{"points": 10, "max": 10, "comment": ""}}, "group_integration": {{"points": 15, "max": 15, "comment": ""}}}}, "bonus_scores": {{"bonus_ai_opportunities": {{"points": 0, "max": 3, "comment": ""}}}}, "feedback": "Solid page with clear evidence."}}"#
    )
}

fn config(max_concurrent_pages: usize) -> Config {
    Config {
        max_concurrent_pages,
        llm_timeout_secs: 1,
        ..Config::default()
    }
}

fn engine_with(model: Arc<MarkerModel>, max_concurrent_pages: usize) -> GradingEngine {
    GradingEngine::new(model, &config(max_concurrent_pages)).unwrap()
}

fn engine() -> GradingEngine {
    engine_with(Arc::new(MarkerModel::default()), 4)
}

fn two_page_submission(id: &str) -> SubmissionInput {
    SubmissionInput::new(
        id,
        vec![
            PageInput::new(1, "Heuristic 1 analysis [[vq=20]]"),
            PageInput::new(2, "Heuristic 2 analysis [[vq=20]]"),
        ],
    )
}

fn points(result: &rubric_grader::SubmissionResult, criterion: CriterionId) -> Option<u32> {
    result.criterion(criterion).and_then(AggregateScore::points)
}

#[tokio::test]
async fn test_grade_submission_end_to_end() {
    let engine = engine();
    let input = SubmissionInput::new(
        "group-3",
        vec![
            PageInput::new(1, "Group 3 Heuristic Evaluation [[cover]]"),
            PageInput::new(2, "Checkout flow analysis [[vq=20]]"),
            PageInput::new(3, "Search page analysis [[vq=18]]"),
            PageInput::new(4, "Settings page analysis [[vq=20]] [[trunc]]"),
        ],
    );

    let result = engine.grade_submission(input).await.unwrap();

    assert_eq!(result.pages.len(), 4);
    assert_eq!(result.page(1).unwrap().skip_reason(), Some("cover page"));
    assert_eq!(
        result.criterion(CriterionId::ViolationQuality),
        Some(&AggregateScore::Scored {
            points: 18,
            max: 20,
            lowest_page: 3
        })
    );
    assert_eq!(
        result.criterion(CriterionId::Coverage),
        Some(&AggregateScore::Derived { points: 1, max: 15 })
    );
    assert!(result.warnings.is_empty());
    assert!(result.complete);
    assert_eq!(result.total_points, 84);

    assert_eq!(result.degraded.len(), 1);
    assert_eq!(result.degraded[0].page_index, 4);
    assert_eq!(result.degraded[0].kind, DegradedKind::Repaired);
    assert_eq!(result.page(4).unwrap().feedback, "Solid page with");

    assert_eq!(
        result.coverage.heuristics,
        vec![
            Heuristic::MatchSystemRealWorld,
            Heuristic::UserControlFreedom,
            Heuristic::ConsistencyStandards
        ]
    );
    assert_eq!(result.coverage.total_violations, 3);
    assert_eq!(result.coverage.coverage_points, 1);

    assert_eq!(engine.result("group-3").await, Some(result));
}

#[tokio::test]
async fn test_page_concurrency_is_bounded() {
    let model = Arc::new(MarkerModel::default());
    let engine = engine_with(Arc::clone(&model), 3);
    let pages = (1..=8)
        .map(|i| PageInput::new(i, format!("page {} [[vq=19]]", i)))
        .collect();

    let result = engine
        .grade_submission(SubmissionInput::new("bounded", pages))
        .await
        .unwrap();

    assert_eq!(result.pages.len(), 8);
    assert_eq!(model.calls.load(Ordering::SeqCst), 8);
    assert!(model.peak() <= 3, "peak in-flight calls: {}", model.peak());
    assert!(model.peak() >= 1);
    assert_eq!(points(&result, CriterionId::ViolationQuality), Some(19));
}

#[tokio::test]
async fn test_timed_out_page_degrades_without_blocking_siblings() {
    let engine = engine();
    let input = SubmissionInput::new(
        "slow",
        vec![
            PageInput::new(1, "analysis [[vq=17]]"),
            PageInput::new(2, "analysis [[hang]]"),
        ],
    );

    let result = engine.grade_submission(input).await.unwrap();

    let hung = result.page(2).unwrap();
    assert_eq!(hung.skip_reason(), Some("extraction failed"));
    assert!(hung.scores.is_empty());
    assert_eq!(result.degraded.len(), 1);
    assert_eq!(result.degraded[0].kind, DegradedKind::UpstreamTimeout);
    assert_eq!(points(&result, CriterionId::ViolationQuality), Some(17));
}

#[tokio::test]
async fn test_finalize_is_idempotent() {
    let engine = engine();
    let graded = engine.grade_submission(two_page_submission("idem")).await.unwrap();

    let first = engine.finalize("idem").await.unwrap();
    let second = engine.finalize("idem").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first, graded);
}

#[tokio::test]
async fn test_overrides_on_different_pairs_commute() {
    let a = engine();
    let b = engine();
    a.grade_submission(two_page_submission("s")).await.unwrap();
    b.grade_submission(two_page_submission("s")).await.unwrap();

    let first = OverrideRecord::new("s", 1, "screenshots", 6);
    let second = OverrideRecord::new("s", 2, "writing_quality", 4).with_reviewer("TA Kim");

    a.apply_override(first.clone()).await.unwrap();
    let from_a = a.apply_override(second.clone()).await.unwrap();
    b.apply_override(second).await.unwrap();
    let from_b = b.apply_override(first).await.unwrap();

    assert_eq!(from_a.criteria, from_b.criteria);
    assert_eq!(from_a.pages, from_b.pages);
    assert_eq!(from_a.total_points, from_b.total_points);
    assert_eq!(points(&from_a, CriterionId::Screenshots), Some(6));
    assert_eq!(points(&from_a, CriterionId::WritingQuality), Some(4));
}

#[tokio::test]
async fn test_concurrent_overrides_are_serialized() {
    let engine = Arc::new(engine());
    engine.grade_submission(two_page_submission("c")).await.unwrap();

    let (left, right) = tokio::join!(
        engine.apply_override(OverrideRecord::new("c", 1, "screenshots", 6)),
        engine.apply_override(OverrideRecord::new("c", 2, "severity_analysis", 3)),
    );
    left.unwrap();
    right.unwrap();

    let log = engine.override_log("c").await;
    let sequences: Vec<u64> = log.iter().map(|entry| entry.sequence).collect();
    assert_eq!(sequences, vec![1, 2]);

    let result = engine.result("c").await.unwrap();
    assert_eq!(result.overrides_applied, 2);
    assert_eq!(points(&result, CriterionId::Screenshots), Some(6));
    assert_eq!(points(&result, CriterionId::SeverityAnalysis), Some(3));
}

#[tokio::test]
async fn test_same_pair_is_last_applied_wins() {
    let engine = engine();
    engine.grade_submission(two_page_submission("lw")).await.unwrap();

    engine
        .apply_override(OverrideRecord::new("lw", 1, "violation_quality", 12))
        .await
        .unwrap();
    let result = engine
        .apply_override(OverrideRecord::new("lw", 1, "violation_quality", 15))
        .await
        .unwrap();

    let score = &result.page(1).unwrap().scores[&CriterionId::ViolationQuality];
    assert_eq!(score.points, 15);
    assert!(score.overridden);
    assert_eq!(points(&result, CriterionId::ViolationQuality), Some(15));

    let log = engine.override_log("lw").await;
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].previous_value, Some(20));
    assert_eq!(log[1].previous_value, Some(12));
}

#[tokio::test]
async fn test_lowering_override_never_raises_aggregate() {
    let engine = engine();
    let before = engine.grade_submission(two_page_submission("mono")).await.unwrap();

    let after = engine
        .apply_override(OverrideRecord::new("mono", 2, "professional_quality", 7))
        .await
        .unwrap();

    let before = points(&before, CriterionId::ProfessionalQuality).unwrap();
    let after = points(&after, CriterionId::ProfessionalQuality).unwrap();
    assert!(after <= before);
    assert_eq!(after, 7);
}

#[tokio::test]
async fn test_rejected_override_leaves_state_unchanged() {
    let engine = engine();
    let before = engine.grade_submission(two_page_submission("v")).await.unwrap();

    let out_of_range = engine
        .apply_override(OverrideRecord::new("v", 1, "screenshots", 11))
        .await;
    assert!(matches!(
        out_of_range,
        Err(AppError::Validation(ValidationError::ValueOutOfRange { max: 10, .. }))
    ));

    let unknown_page = engine
        .apply_override(OverrideRecord::new("v", 9, "screenshots", 5))
        .await;
    assert!(matches!(
        unknown_page,
        Err(AppError::Validation(ValidationError::UnknownPage { page_index: 9, .. }))
    ));

    let unknown_submission = engine
        .apply_override(OverrideRecord::new("nope", 1, "screenshots", 5))
        .await;
    assert!(matches!(
        unknown_submission,
        Err(AppError::Validation(ValidationError::UnknownSubmission { .. }))
    ));

    assert!(engine.override_log("v").await.is_empty());
    assert_eq!(engine.result("v").await, Some(before));
}

#[tokio::test]
async fn test_results_and_override_log_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ResultWriter::new(dir.path());
    let engine = engine().with_writer(writer.clone());

    engine.grade_submission(two_page_submission("disk")).await.unwrap();
    engine
        .apply_override(OverrideRecord::new("disk", 2, "screenshots", 8).with_note("cropped"))
        .await
        .unwrap();

    assert!(writer.page_path("disk", 1).exists());
    assert!(writer.page_path("disk", 2).exists());

    let saved: rubric_grader::SubmissionResult =
        serde_json::from_str(&std::fs::read_to_string(writer.result_path("disk")).unwrap()).unwrap();
    assert_eq!(saved.overrides_applied, 1);
    assert_eq!(points(&saved, CriterionId::Screenshots), Some(8));

    let log = std::fs::read_to_string(writer.override_log_path("disk")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("cropped"));
}

#[tokio::test]
async fn test_result_file_failure_keeps_committed_state() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ResultWriter::new(dir.path());
    // 结果文件路径被目录占用，写入必然失败
    std::fs::create_dir_all(writer.result_path("blocked")).unwrap();
    let engine = engine().with_writer(writer.clone());

    let graded = engine.grade_submission(two_page_submission("blocked")).await;
    assert!(graded.is_ok());
    assert!(writer.page_path("blocked", 1).exists());

    let result = engine
        .apply_override(OverrideRecord::new("blocked", 1, "screenshots", 6))
        .await
        .unwrap();
    assert_eq!(points(&result, CriterionId::Screenshots), Some(6));
    assert_eq!(engine.override_log("blocked").await.len(), 1);

    let log = std::fs::read_to_string(writer.override_log_path("blocked")).unwrap();
    assert_eq!(log.lines().count(), 1);
}

#[tokio::test]
async fn test_corrections_feed_is_filtered_per_submission() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ResultWriter::new(dir.path());
    let engine = engine().with_writer(writer.clone());
    engine.grade_submission(two_page_submission("a")).await.unwrap();
    engine.grade_submission(two_page_submission("b")).await.unwrap();
    let before = engine.result("a").await;

    engine
        .report_correction(
            CorrectionReport::new("a", 1, "violation_quality", "missed heuristic 4").with_values("20", "16"),
        )
        .await
        .unwrap();
    engine
        .report_correction(CorrectionReport::new("b", 2, "feedback", "too generic"))
        .await
        .unwrap();
    let rejected = engine
        .report_correction(CorrectionReport::new("a", 7, "feedback", "no such page"))
        .await;
    assert!(matches!(rejected, Err(ref e) if e.is_rejection()));

    let only_a = engine.corrections(Some("a")).await;
    assert_eq!(only_a.len(), 1);
    assert_eq!(only_a[0].report.corrected_value.as_deref(), Some("16"));
    assert_eq!(engine.corrections(None).await.len(), 2);
    assert!(engine.corrections(Some("missing")).await.is_empty());

    // 纠错记录不改变分数
    assert_eq!(engine.result("a").await, before);
    let log = std::fs::read_to_string(writer.correction_log_path("a")).unwrap();
    assert_eq!(log.lines().count(), 1);
}

#[tokio::test]
async fn test_risk_flags_toggle_through_engine() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ResultWriter::new(dir.path());
    let engine = engine().with_writer(writer.clone());
    engine.grade_submission(two_page_submission("flags")).await.unwrap();

    assert_eq!(
        engine.toggle_risk_flag("flags", 2, "screenshot mismatch").await.unwrap(),
        RiskFlagToggle::Added
    );
    let flags = engine.risk_flags("flags").await;
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].notes, "screenshot mismatch");
    assert!(writer.risk_flags_path("flags").exists());

    assert_eq!(
        engine.toggle_risk_flag("flags", 2, "").await.unwrap(),
        RiskFlagToggle::Removed
    );
    assert!(engine.risk_flags("flags").await.is_empty());

    assert!(matches!(
        engine.toggle_risk_flag("nobody", 1, "").await,
        Err(AppError::Validation(ValidationError::UnknownSubmission { .. }))
    ));
}
