use crate::generator::types::ReportMode;

/// 结构化报关单中常见的字段关键词（中文、英文、越南文）
const CUSTOMS_KEYWORDS: &[&str] = &[
    // 中文
    "报关单",
    "报关",
    "申报",
    "海关编号",
    "备案号",
    "hs编码",
    "商品编码",
    "税则号",
    "收货人",
    "发货人",
    "境内收货人",
    "境外发货人",
    "毛重",
    "净重",
    "成交方式",
    "贸易方式",
    "原产国",
    "原产地",
    "启运国",
    "监管方式",
    "征免",
    // English
    "declaration no",
    "entry no",
    "hs code",
    "tariff code",
    "consignee",
    "consignor",
    "gross weight",
    "net weight",
    "incoterms",
    "trade terms",
    "invoice value",
    "country of origin",
    // Tiếng Việt
    "tờ khai",
    "mã hs",
    "người nhận hàng",
    "người gửi hàng",
    "trọng lượng",
    "xuất xứ",
    "hải quan",
];

/// 命中次数达到该值即判定为报关审查
const CUSTOMS_MIN_HITS: usize = 2;

/// 已计数片段的占位符，防止较短关键词重复命中同一位置
const CONSUMED: &str = "\u{1}";

/// 统计主题中报关关键词的出现次数
///
/// 按关键词长度从长到短匹配，命中的片段即被消耗，
/// 因此 "境内收货人" 只计一次，不会再命中 "收货人"。
pub fn keyword_hits(topic: &str) -> usize {
    let mut keywords: Vec<&str> = CUSTOMS_KEYWORDS.to_vec();
    keywords.sort_by_key(|k| std::cmp::Reverse(k.chars().count()));

    let mut remaining = topic.to_lowercase();
    let mut hits = 0;
    for keyword in keywords {
        let count = remaining.matches(keyword).count();
        if count > 0 {
            hits += count;
            remaining = remaining.replace(keyword, CONSUMED);
        }
    }
    hits
}

/// 根据关键词命中数选择报告模式
pub fn route(topic: &str) -> ReportMode {
    if keyword_hits(topic) >= CUSTOMS_MIN_HITS {
        ReportMode::Customs
    } else {
        ReportMode::Research
    }
}
