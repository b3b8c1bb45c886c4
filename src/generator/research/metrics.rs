//! 证据质量评分，完全由 `ResearchContext` 推导

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::QualityConfig;
use crate::evidence::is_no_evidence;
use crate::generator::types::ResearchContext;
use crate::i18n::ReportLanguage;

/// 序号、条款、列表符号等枚举标记
static ENUMERATION_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)(?:^|\s)(?:\d+(?:[、)）]|\.\s)|[（(][0-9一二三四五六七八九十]+[)）]|[一二三四五六七八九十]+、|[-*•]\s)|第[0-9一二三四五六七八九十百]+[条款项章]",
    )
    .expect("enumeration regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Excellent,
    Medium,
    Poor,
}

impl QualityLevel {
    pub fn from_total(total: f64) -> Self {
        if total >= 0.75 {
            QualityLevel::Excellent
        } else if total >= 0.45 {
            QualityLevel::Medium
        } else {
            QualityLevel::Poor
        }
    }
}

/// 合规分析关注的五类证据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageArea {
    Standards,
    RiskFactors,
    PrecedentCases,
    PenaltyBasis,
    BenchmarkData,
}

impl CoverageArea {
    pub const ALL: [CoverageArea; 5] = [
        CoverageArea::Standards,
        CoverageArea::RiskFactors,
        CoverageArea::PrecedentCases,
        CoverageArea::PenaltyBasis,
        CoverageArea::BenchmarkData,
    ];

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            CoverageArea::Standards => &[
                "标准", "规定", "规范", "办法", "条例", "要求", "standard", "regulation",
                "requirement", "criteria", "tiêu chuẩn", "quy định",
            ],
            CoverageArea::RiskFactors => &[
                "风险", "隐患", "异常", "可疑", "risk", "anomal", "suspicious", "rủi ro",
                "bất thường",
            ],
            CoverageArea::PrecedentCases => &[
                "案例", "案件", "违规", "违法", "走私", "查获", "case", "violation",
                "precedent", "smuggl", "vụ việc", "vi phạm", "buôn lậu",
            ],
            CoverageArea::PenaltyBasis => &[
                "处罚", "罚款", "罚则", "没收", "法律责任", "penalt", "fined", "sanction",
                "confiscat", "xử phạt", "phạt tiền",
            ],
            CoverageArea::BenchmarkData => &[
                "均价", "参考价", "基准", "统计", "数据", "比例", "benchmark", "average",
                "statistic", "reference price", "giá tham chiếu", "số liệu",
            ],
        }
    }

    pub fn label(&self, language: ReportLanguage) -> &'static str {
        match (self, language) {
            (CoverageArea::Standards, ReportLanguage::Chinese) => "标准/判定依据",
            (CoverageArea::RiskFactors, ReportLanguage::Chinese) => "风险因素",
            (CoverageArea::PrecedentCases, ReportLanguage::Chinese) => "先例/违规案例",
            (CoverageArea::PenaltyBasis, ReportLanguage::Chinese) => "处罚依据",
            (CoverageArea::BenchmarkData, ReportLanguage::Chinese) => "基准数据",
            (CoverageArea::Standards, ReportLanguage::English) => "standards/criteria",
            (CoverageArea::RiskFactors, ReportLanguage::English) => "risk factors",
            (CoverageArea::PrecedentCases, ReportLanguage::English) => "precedent/violation cases",
            (CoverageArea::PenaltyBasis, ReportLanguage::English) => "penalty basis",
            (CoverageArea::BenchmarkData, ReportLanguage::English) => "benchmark data",
            (CoverageArea::Standards, ReportLanguage::Vietnamese) => "tiêu chuẩn/căn cứ",
            (CoverageArea::RiskFactors, ReportLanguage::Vietnamese) => "yếu tố rủi ro",
            (CoverageArea::PrecedentCases, ReportLanguage::Vietnamese) => "vụ việc vi phạm",
            (CoverageArea::PenaltyBasis, ReportLanguage::Vietnamese) => "căn cứ xử phạt",
            (CoverageArea::BenchmarkData, ReportLanguage::Vietnamese) => "số liệu tham chiếu",
        }
    }

    fn is_covered_by(&self, lowered_text: &str) -> bool {
        self.keywords().iter().any(|k| lowered_text.contains(k))
    }
}

/// 当前片段的内容特征
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFeatures {
    pub char_count: usize,
    pub has_digits: bool,
    pub has_structure: bool,
    pub has_enumeration: bool,
}

impl ContentFeatures {
    pub fn detect(snippet: &str) -> Self {
        if is_no_evidence(snippet) {
            return Self::default();
        }
        Self {
            char_count: snippet.chars().count(),
            has_digits: snippet.chars().any(|c| c.is_ascii_digit()),
            has_structure: snippet.contains([':', '：', ',', '，']),
            has_enumeration: ENUMERATION_MARKERS.is_match(snippet),
        }
    }

    /// 内容丰富度，范围 [0,1]
    pub fn richness(&self) -> f64 {
        if self.char_count == 0 {
            return 0.0;
        }
        let length = match self.char_count {
            n if n >= 200 => 0.4,
            n if n >= 100 => 0.3,
            n if n >= 50 => 0.2,
            _ => 0.1,
        };
        let bonus = [self.has_digits, self.has_structure, self.has_enumeration]
            .iter()
            .filter(|flag| **flag)
            .count() as f64
            * 0.2;
        (length + bonus).min(1.0)
    }
}

/// 一轮检索的质量评估结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub score_component: f64,
    pub richness_component: f64,
    pub dedup_component: f64,
    pub evidence_component: f64,
    pub total_quality: f64,
    pub quality_level: QualityLevel,
    /// 与上一轮总分的差值，首轮为 0
    pub trend_indicator: f64,
    pub content_features: ContentFeatures,
    pub coverage_areas: Vec<CoverageArea>,
    /// 已覆盖的证据类别占比
    pub sufficiency_percent: f64,
    pub duplication_percent: f64,
}

impl QualityMetrics {
    /// 计算本轮质量，趋势通过重算上一轮得到
    pub fn evaluate(context: &ResearchContext, config: &QualityConfig) -> Self {
        let mut metrics = Self::snapshot(context, config);
        if let Some(previous) = context.previous_round() {
            let previous = Self::snapshot(&previous, config);
            metrics.trend_indicator = metrics.total_quality - previous.total_quality;
        }
        metrics
    }

    fn snapshot(context: &ResearchContext, config: &QualityConfig) -> Self {
        let weights = &config.weights;

        let score_component = context.current_score.clamp(0.0, 1.0) * weights.score;

        let content_features = ContentFeatures::detect(&context.current_snippet);
        let richness_component = content_features.richness() * weights.content;

        let max_similarity = context
            .search_history
            .iter()
            .map(|r| char_similarity(&context.current_snippet, &r.snippet))
            .fold(0.0_f64, f64::max);
        let dedup = if max_similarity > config.dedup_threshold {
            0.0
        } else {
            1.0
        };
        let dedup_component = dedup * weights.dedup;

        let evidence_component = evidence_sufficiency(context) * weights.evidence;

        let coverage_areas = coverage_of(context);
        let sufficiency_percent = coverage_areas.len() as f64 / CoverageArea::ALL.len() as f64;

        let total_quality =
            (score_component + richness_component + dedup_component + evidence_component)
                .clamp(0.0, 1.0);

        Self {
            score_component,
            richness_component,
            dedup_component,
            evidence_component,
            total_quality,
            quality_level: QualityLevel::from_total(total_quality),
            trend_indicator: 0.0,
            content_features,
            coverage_areas,
            sufficiency_percent,
            duplication_percent: 1.0 - dedup,
        }
    }

    pub fn missing_areas(&self) -> Vec<CoverageArea> {
        CoverageArea::ALL
            .into_iter()
            .filter(|area| !self.coverage_areas.contains(area))
            .collect()
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{F900}'..='\u{FAFF}')
}

/// 主文字集合上的 Jaccard 相似度
///
/// 任一文本含汉字时只比较汉字，否则比较小写字母数字。
pub fn char_similarity(a: &str, b: &str) -> f64 {
    let cjk = a.chars().any(is_cjk) || b.chars().any(is_cjk);
    let char_set = |text: &str| -> HashSet<char> {
        if cjk {
            text.chars().filter(|c| is_cjk(*c)).collect()
        } else {
            text.chars()
                .flat_map(char::to_lowercase)
                .filter(|c| c.is_alphanumeric())
                .collect()
        }
    };

    let (left, right) = (char_set(a), char_set(b));
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

/// 累计证据充分度：篇幅、检索词多样性、片段差异度
fn evidence_sufficiency(context: &ResearchContext) -> f64 {
    let real: Vec<(&str, &str)> = context
        .search_history
        .iter()
        .map(|r| (r.query.as_str(), r.snippet.as_str()))
        .chain(std::iter::once((
            context.current_query.as_str(),
            context.current_snippet.as_str(),
        )))
        .filter(|(_, snippet)| !is_no_evidence(snippet))
        .collect();

    if real.is_empty() {
        return 0.0;
    }

    let volume: usize = real.iter().map(|(_, s)| s.chars().count()).sum();
    let volume_score = match volume {
        n if n >= 1500 => 0.4,
        n if n >= 800 => 0.3,
        n if n >= 300 => 0.2,
        _ => 0.1,
    };

    let distinct_queries: HashSet<String> = real
        .iter()
        .map(|(q, _)| normalize_query(q))
        .filter(|q| !q.is_empty())
        .collect();
    let query_score = match distinct_queries.len() {
        0 => 0.0,
        1 => 0.1,
        2 => 0.2,
        _ => 0.3,
    };

    let diversity_score = if real.len() < 2 {
        0.3
    } else {
        let mut total = 0.0;
        let mut pairs = 0usize;
        for (i, (_, a)) in real.iter().enumerate() {
            for (_, b) in &real[i + 1..] {
                total += char_similarity(a, b);
                pairs += 1;
            }
        }
        0.3 * (1.0 - total / pairs as f64)
    };

    (volume_score + query_score + diversity_score).min(1.0)
}

fn coverage_of(context: &ResearchContext) -> Vec<CoverageArea> {
    let corpus = context
        .all_snippets()
        .filter(|s| !is_no_evidence(s))
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase();

    CoverageArea::ALL
        .into_iter()
        .filter(|area| area.is_covered_by(&corpus))
        .collect()
}

/// 检索词归一化：小写并折叠空白
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
