use serde::{Deserialize, Serialize};

use crate::resolver::Resolution;

// ===== REQUEST TYPES =====

/// What to do with a submitted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentTask {
    Polish,
    Summarize,
    ComplianceCheck,
}

impl DocumentTask {
    /// Wording used inside the prompt.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentTask::Polish => "全文润色（正式风）",
            DocumentTask::Summarize => "总结要点",
            DocumentTask::ComplianceCheck => "合规性检查",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadedFile {
    #[serde(default)]
    pub name: String,
    pub mime_type: String,
    /// Standard base64, optionally as a data URL.
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub task: DocumentTask,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file: Option<UploadedFile>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoRequest {
    pub mime_type: String,
    pub data: String,
}

/// Fill-in-the-blank templates. Omitted fields take the sample values shown
/// in the form.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum DraftRequest {
    WetlandPatrolLog {
        #[serde(default = "defaults::patrol_location")]
        location: String,
        #[serde(default = "defaults::patrol_species")]
        species: String,
        #[serde(default = "defaults::patrol_conditions")]
        conditions: String,
    },
    SpringFireNotice {
        #[serde(default = "defaults::fire_audience")]
        audience: String,
        #[serde(default = "defaults::fire_period")]
        period: String,
    },
    WildlifeProtectionAdvice {
        #[serde(default = "defaults::wildlife_region")]
        region: String,
        #[serde(default = "defaults::wildlife_species")]
        species: String,
        #[serde(default = "defaults::wildlife_concerns")]
        concerns: String,
    },
}

mod defaults {
    pub fn patrol_location() -> String {
        "XX 湿地保护区".to_string()
    }
    pub fn patrol_species() -> String {
        "黑鹳、天鹅等".to_string()
    }
    pub fn patrol_conditions() -> String {
        "水位平稳，植被生长良好，无盗猎行为。".to_string()
    }
    pub fn fire_audience() -> String {
        "各护林站、周边村民".to_string()
    }
    pub fn fire_period() -> String {
        "3月1日至5月1日".to_string()
    }
    pub fn wildlife_region() -> String {
        "XX 林场及周边山区".to_string()
    }
    pub fn wildlife_species() -> String {
        "野猪、红腹锦鸡等".to_string()
    }
    pub fn wildlife_concerns() -> String {
        "野猪下山损毁农作物，偶有非法捕猎线索。".to_string()
    }
}

// ===== RESPONSE TYPES =====

#[derive(Debug, Serialize, Deserialize)]
pub struct GeneratedText {
    pub model: String,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DraftResponse {
    pub model: String,
    pub text: String,
    pub filename: String,
    pub generated_at: String,
}

#[derive(Debug, Serialize)]
pub struct ModelStatus {
    pub model: String,
    pub resolution: Resolution,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
