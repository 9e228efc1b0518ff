use crate::models::{DocumentTask, DraftRequest};

pub const PHOTO_PROMPT: &str = "请识别图中的生物，并写一段专业的林业科普或鉴定报告。";

/// Build the prompt for the document tab
pub fn build_document_prompt(task: DocumentTask, content: &str) -> String {
    format!(
        "请作为林业局资深文秘，对以下内容进行{}：\n\n{}",
        task.label(),
        content.trim()
    )
}

/// Build the prompt for a fill-in-the-blank draft. `today` is the local date.
pub fn build_draft_prompt(draft: &DraftRequest, today: &str) -> String {
    match draft {
        DraftRequest::WetlandPatrolLog {
            location,
            species,
            conditions,
        } => format!(
            "请写一份专业的湿地巡护日志。日期：{}，地点：{}，物种：{}，情况：{}。",
            today, location, species, conditions
        ),
        DraftRequest::SpringFireNotice { audience, period } => format!(
            "请起草一份林业局春季防火通知。对象：{}，日期：{}。要求语气严谨庄重，落款日期为{}。",
            audience, period, today
        ),
        DraftRequest::WildlifeProtectionAdvice {
            region,
            species,
            concerns,
        } => format!(
            "请起草一份野生动物保护建议。区域：{}，重点物种：{}，现存问题：{}。要求措施具体、可操作，落款日期为{}。",
            region, species, concerns, today
        ),
    }
}
