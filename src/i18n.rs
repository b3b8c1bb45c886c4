use serde::{Deserialize, Serialize};

use crate::generator::types::ReportMode;

/// 报告输出语言
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReportLanguage {
    #[serde(rename = "zh")]
    #[default]
    Chinese,
    #[serde(rename = "en")]
    English,
    #[serde(rename = "vi")]
    Vietnamese,
}

impl std::fmt::Display for ReportLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportLanguage::Chinese => write!(f, "zh"),
            ReportLanguage::English => write!(f, "en"),
            ReportLanguage::Vietnamese => write!(f, "vi"),
        }
    }
}

impl std::str::FromStr for ReportLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zh" | "chinese" | "中文" => Ok(ReportLanguage::Chinese),
            "en" | "english" | "英文" => Ok(ReportLanguage::English),
            "vi" | "vietnamese" | "tiếng việt" | "越南语" => Ok(ReportLanguage::Vietnamese),
            _ => Err(format!("Unknown report language: {}", s)),
        }
    }
}

impl ReportLanguage {
    /// 获取语言的提示词指令
    pub fn prompt_instruction(&self) -> &'static str {
        match self {
            ReportLanguage::Chinese => {
                "【语言要求】你必须使用简体中文输出全部内容，包括结论、理由和建议。引用的参考资料可以保留原文。"
            }
            ReportLanguage::English => {
                "[Language] Write every part of the output in English, including conclusions, reasoning and recommendations. Quoted reference material may stay in its original language."
            }
            ReportLanguage::Vietnamese => {
                "[Ngôn ngữ] TẤT CẢ nội dung, bao gồm kết luận, lý do và đề xuất, PHẢI được viết bằng tiếng Việt. Chỉ phần trích dẫn tài liệu tham khảo được giữ nguyên ngôn ngữ gốc."
            }
        }
    }

    /// 目录规划失败时使用的标准目录，最后一章固定为总结章节
    pub fn fallback_outline(&self, mode: ReportMode) -> Vec<String> {
        let titles: &[&str] = match (mode, self) {
            (ReportMode::Customs, ReportLanguage::Chinese) => &[
                "1. 申报数据概览",
                "2. 商品归类与税则审查",
                "3. 价格与原产地合规审查",
                "4. 风险分析",
                "5. 改进建议与总结",
            ],
            (ReportMode::Customs, ReportLanguage::English) => &[
                "1. Declaration Data Overview",
                "2. Classification and Tariff Review",
                "3. Valuation and Origin Compliance",
                "4. Risk Analysis",
                "5. Recommendations and Summary",
            ],
            (ReportMode::Customs, ReportLanguage::Vietnamese) => &[
                "1. Tổng quan dữ liệu tờ khai",
                "2. Kiểm tra phân loại và mã số thuế",
                "3. Kiểm tra trị giá và xuất xứ",
                "4. Phân tích rủi ro",
                "5. Kiến nghị và tổng kết",
            ],
            (ReportMode::Research, ReportLanguage::Chinese) => &[
                "1. 背景与问题界定",
                "2. 相关标准与法规依据",
                "3. 风险因素与典型案例",
                "4. 结论与建议",
            ],
            (ReportMode::Research, ReportLanguage::English) => &[
                "1. Background and Problem Statement",
                "2. Applicable Standards and Regulations",
                "3. Risk Factors and Precedent Cases",
                "4. Conclusions and Recommendations",
            ],
            (ReportMode::Research, ReportLanguage::Vietnamese) => &[
                "1. Bối cảnh và xác định vấn đề",
                "2. Tiêu chuẩn và căn cứ pháp lý",
                "3. Yếu tố rủi ro và vụ việc điển hình",
                "4. Kết luận và kiến nghị",
            ],
        };
        titles.iter().map(|t| t.to_string()).collect()
    }

    /// 内置的角色设定，未配置指导文件时使用
    pub fn default_guidance(&self, mode: ReportMode) -> &'static str {
        match (mode, self) {
            (ReportMode::Customs, ReportLanguage::Chinese) => {
                "你是一名拥有20年经验的资深海关合规审计专家。请依据通用海关法规与审单作业规范，对报关数据逐项审查，语气客观、专业，重点指出风险点并给出可操作的整改建议。"
            }
            (ReportMode::Customs, ReportLanguage::English) => {
                "You are a senior customs compliance auditor with 20 years of experience. Review the declaration item by item against general customs regulations and examination practice. Stay objective and professional, highlight risks and give actionable remediation advice."
            }
            (ReportMode::Customs, ReportLanguage::Vietnamese) => {
                "Bạn là chuyên gia kiểm tra tuân thủ hải quan cấp cao với 20 năm kinh nghiệm. Hãy xem xét từng mục của tờ khai theo quy định hải quan chung, giữ giọng văn khách quan, chuyên nghiệp, chỉ ra rủi ro và đưa ra đề xuất khắc phục cụ thể."
            }
            (ReportMode::Research, ReportLanguage::Chinese) => {
                "你是一名严谨的研究分析师。请基于检索到的证据开展分析，区分事实与推断，引用依据时注明来源，结论需要有证据支撑。"
            }
            (ReportMode::Research, ReportLanguage::English) => {
                "You are a rigorous research analyst. Ground the analysis in the retrieved evidence, separate facts from inference, cite the source of every reference and support each conclusion with evidence."
            }
            (ReportMode::Research, ReportLanguage::Vietnamese) => {
                "Bạn là nhà phân tích nghiên cứu nghiêm túc. Hãy phân tích dựa trên bằng chứng đã truy xuất, phân biệt sự thật với suy luận, ghi rõ nguồn trích dẫn và mọi kết luận phải có bằng chứng."
            }
        }
    }

    /// 兜底检索词的后缀，按轮次循环取用（第1轮不加后缀）
    pub fn query_suffixes(&self) -> &'static [&'static str] {
        match self {
            ReportLanguage::Chinese => &["", "法规依据", "风险案例", "处罚标准", "操作规程"],
            ReportLanguage::English => &[
                "",
                "regulations",
                "risk cases",
                "penalty standards",
                "procedures",
            ],
            ReportLanguage::Vietnamese => &[
                "",
                "căn cứ pháp lý",
                "vụ việc rủi ro",
                "mức xử phạt",
                "quy trình",
            ],
        }
    }

    pub fn thought_mode(&self, mode: ReportMode) -> String {
        match self {
            ReportLanguage::Chinese => format!("已识别报告模式：{}", mode.label(*self)),
            ReportLanguage::English => format!("Report mode detected: {}", mode.label(*self)),
            ReportLanguage::Vietnamese => {
                format!("Đã xác định chế độ báo cáo: {}", mode.label(*self))
            }
        }
    }

    pub fn thought_planning(&self) -> &'static str {
        match self {
            ReportLanguage::Chinese => "正在分析主题并规划报告目录...",
            ReportLanguage::English => "Analyzing the topic and planning the table of contents...",
            ReportLanguage::Vietnamese => "Đang phân tích chủ đề và lập mục lục báo cáo...",
        }
    }

    pub fn thought_research(&self, title: &str) -> String {
        match self {
            ReportLanguage::Chinese => format!("开始为《{}》检索本地依据", title),
            ReportLanguage::English => format!("Gathering local evidence for \"{}\"", title),
            ReportLanguage::Vietnamese => format!("Bắt đầu tìm căn cứ cho \"{}\"", title),
        }
    }

    pub fn thought_synthesis(&self, title: &str) -> String {
        match self {
            ReportLanguage::Chinese => format!("《{}》为总结章节，基于已完成内容直接撰写", title),
            ReportLanguage::English => {
                format!("\"{}\" is the summary chapter; writing it from the report so far", title)
            }
            ReportLanguage::Vietnamese => {
                format!("\"{}\" là chương tổng kết, viết trực tiếp từ nội dung đã có", title)
            }
        }
    }
}
