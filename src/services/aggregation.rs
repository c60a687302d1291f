//! 评分聚合 - 业务能力层
//!
//! 纯函数：输入同一组页面记录，输出永远相同。
//! 每次人工复核后都会整体重算，不做增量修改。

use std::collections::{BTreeMap, BTreeSet};

use crate::models::heuristic::Heuristic;
use crate::models::page::{PageRecord, Severity};
use crate::models::rubric::CriterionId;
use crate::models::submission::{
    AggregateScore, AggregationWarning, CoverageMetrics, DegradedExtraction, SubmissionResult,
    ViolationEntry,
};

/// 覆盖度评分细则
const COVERAGE_HEURISTIC_TARGET: usize = 10;
const COVERAGE_VIOLATION_TARGET: usize = 12;
const COVERAGE_HEURISTIC_FLOOR: usize = 8;
const COVERAGE_VIOLATION_FLOOR: usize = 10;
const COVERAGE_CAP: usize = 10;

/// 聚合一个提交的全部页面
pub fn aggregate(
    submission_id: &str,
    pages: &[PageRecord],
    degraded: &[DegradedExtraction],
    overrides_applied: usize,
) -> SubmissionResult {
    let mut pages = pages.to_vec();
    pages.sort_by_key(|p| p.page_index);

    let coverage = coverage_metrics(&pages);
    let has_content = pages.iter().any(|p| !p.is_skipped());

    let mut criteria = BTreeMap::new();
    let mut warnings = Vec::new();
    for criterion in CriterionId::CORE {
        let mut score = minimum_score(&pages, criterion);
        // 覆盖度按全文计算；页面分（通常来自人工复核）优先
        if criterion == CriterionId::Coverage && score.is_unscored() && has_content {
            score = AggregateScore::Derived {
                points: coverage.coverage_points,
                max: criterion.max_points(),
            };
        }
        if score.is_unscored() {
            tracing::warn!("[提交 {}] ⚠️ 评分项 {} 没有任何页面打分", submission_id, criterion);
            warnings.push(AggregationWarning::UnscoredCriterion { criterion });
        }
        criteria.insert(criterion, score);
    }

    let bonus: BTreeMap<CriterionId, u32> = CriterionId::BONUS
        .into_iter()
        .map(|criterion| (criterion, bonus_score(&pages, criterion)))
        .collect();

    let violations = violation_entries(&pages);

    let total_points = criteria.values().filter_map(AggregateScore::points).sum::<u32>()
        + bonus.values().sum::<u32>();
    let complete = warnings.is_empty();

    let mut degraded = degraded.to_vec();
    degraded.sort_by_key(|d| d.page_index);

    SubmissionResult {
        submission_id: submission_id.to_string(),
        pages,
        criteria,
        bonus,
        coverage,
        violations,
        degraded,
        warnings,
        overrides_applied,
        total_points,
        max_points: CriterionId::core_max_total(),
        complete,
    }
}

/// 最小值规则：所有给该项打分的内容页中的最低分
///
/// 并列时记录页码最小的页面（页面已按页码排序）。
fn minimum_score(pages: &[PageRecord], criterion: CriterionId) -> AggregateScore {
    let max = criterion.max_points();
    pages
        .iter()
        .filter_map(|page| page.score(criterion).map(|points| (points, page.page_index)))
        .min_by_key(|(points, _)| *points)
        .map_or(AggregateScore::Unscored { max }, |(points, lowest_page)| {
            AggregateScore::Scored {
                points: points.min(max),
                max,
                lowest_page,
            }
        })
}

/// 加分项取各页最高分，未授予时为 0
fn bonus_score(pages: &[PageRecord], criterion: CriterionId) -> u32 {
    pages
        .iter()
        .filter_map(|page| page.score(criterion))
        .max()
        .unwrap_or(0)
        .min(criterion.max_points())
}

fn coverage_metrics(pages: &[PageRecord]) -> CoverageMetrics {
    let content = pages.iter().filter(|p| !p.is_skipped());

    let mut distinct = BTreeSet::new();
    let mut total_violations = 0;
    for page in content {
        total_violations += page.violations.len();
        distinct.extend(page.violations.iter().map(|v| v.heuristic));
    }

    let heuristics: Vec<Heuristic> = distinct.into_iter().collect();
    let distinct_heuristics = heuristics.len();

    CoverageMetrics {
        coverage_points: coverage_points(distinct_heuristics, total_violations),
        heuristics,
        distinct_heuristics,
        total_violations,
    }
}

/// 覆盖度评分：满分起扣
pub fn coverage_points(distinct_heuristics: usize, total_violations: usize) -> u32 {
    let heuristics = distinct_heuristics.min(COVERAGE_CAP);
    let mut points = CriterionId::Coverage.max_points();

    if heuristics < COVERAGE_HEURISTIC_TARGET {
        points = points.saturating_sub(5);
    }
    if total_violations < COVERAGE_VIOLATION_TARGET {
        points = points.saturating_sub(5);
    }
    if heuristics < COVERAGE_HEURISTIC_FLOOR {
        points = points.saturating_sub(2);
    }
    if total_violations < COVERAGE_VIOLATION_FLOOR {
        points = points.saturating_sub(2);
    }
    points
}

/// 展开所有问题，并为未写明严重程度的问题从相邻页补齐
fn violation_entries(pages: &[PageRecord]) -> Vec<ViolationEntry> {
    let content: Vec<&PageRecord> = pages.iter().filter(|p| !p.is_skipped()).collect();

    let mut entries = Vec::new();
    for (pos, page) in content.iter().enumerate() {
        for violation in &page.violations {
            let (severity, severity_source) = match violation.severity {
                Some(severity) => (Some(severity), None),
                None => match linked_severity(&content, pos, violation.heuristic) {
                    Some((severity, source)) => (Some(severity), Some(source)),
                    None => (None, None),
                },
            };
            entries.push(ViolationEntry {
                page_index: page.page_index,
                heuristic: violation.heuristic,
                heuristic_name: violation.heuristic_name.clone(),
                description: violation.description.clone(),
                severity,
                severity_source,
            });
        }
    }
    entries
}

/// 相邻内容页（先前一页，再后一页）中同一原则的已写明严重程度
fn linked_severity(
    content: &[&PageRecord],
    pos: usize,
    heuristic: Heuristic,
) -> Option<(Severity, u32)> {
    let previous = pos.checked_sub(1).and_then(|i| content.get(i));
    let next = content.get(pos + 1);

    [previous, next].into_iter().flatten().find_map(|page| {
        page.violations
            .iter()
            .filter(|v| v.heuristic == heuristic)
            .find_map(|v| v.severity)
            .map(|severity| (severity, page.page_index))
    })
}
