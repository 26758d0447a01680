/// Section headers every accepted report must contain, in prompt order.
pub const REQUIRED_SECTIONS: [&str; 5] = ["功能概述", "架构设计", "实现细节", "依赖分析", "核心流程"];

/// Reports shorter than this (after trimming) are rejected outright.
pub const MIN_REPORT_LENGTH: usize = 100;

pub fn verify_report(content: &str) -> bool {
    if content.trim().chars().count() < MIN_REPORT_LENGTH {
        return false;
    }
    missing_sections(content).is_empty()
}

pub fn missing_sections(content: &str) -> Vec<&'static str> {
    REQUIRED_SECTIONS
        .iter()
        .copied()
        .filter(|section| !content.contains(section))
        .collect()
}
