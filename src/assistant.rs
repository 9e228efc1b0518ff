use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{FixedOffset, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::extractor::{self, ExtractError};
use crate::gemini::prompts::{build_document_prompt, build_draft_prompt, PHOTO_PROMPT};
use crate::gemini::{truncate_for_log, GeminiClient, GeminiError, Part};
use crate::media::{self, MediaError};
use crate::models::{
    DocumentRequest, DraftRequest, DraftResponse, ErrorBody, GeneratedText, ModelStatus,
    PhotoRequest,
};
use crate::resolver::ModelResolver;

pub const DRAFT_FILENAME: &str = "起草稿.txt";

// China Standard Time, used for dates written into drafts.
const LOCAL_OFFSET: FixedOffset = match FixedOffset::east_opt(8 * 3600) {
    Some(offset) => offset,
    None => panic!("invalid UTC offset"),
};

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("no content provided")]
    MissingContent,
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Generation(#[from] GeminiError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AssistantError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AssistantError::MissingContent => StatusCode::BAD_REQUEST,
            AssistantError::Extract(ExtractError::Unsupported(_)) => StatusCode::BAD_REQUEST,
            AssistantError::Extract(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AssistantError::Media(_) => StatusCode::BAD_REQUEST,
            AssistantError::Generation(e) if e.is_rate_limited() => StatusCode::TOO_MANY_REQUESTS,
            AssistantError::Generation(_) => StatusCode::BAD_GATEWAY,
            AssistantError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text shown to the person using the tool.
    pub fn user_message(&self) -> String {
        match self {
            AssistantError::MissingContent => "请先提供内容哦".to_string(),
            AssistantError::Extract(ExtractError::Unsupported(_)) => {
                "目前只支持 Word (.docx) 或 PDF 文件，也可以直接粘贴文字。".to_string()
            }
            AssistantError::Extract(e) => format!("❌ 文件读取失败：{}", e),
            AssistantError::Media(e) => format!("❌ 上传内容无法读取：{}", e),
            AssistantError::Generation(e) if e.is_rate_limited() => {
                "⏳ 现在使用的人有点多，AI 额度暂时用完了。请喝口茶，等一分钟再试试。".to_string()
            }
            AssistantError::Generation(e) => format!("❌ 生成失败：{}", e),
            AssistantError::Task(e) => format!("❌ 处理失败：{}", e),
        }
    }
}

impl IntoResponse for AssistantError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.user_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// The three actions of the tool, sharing one client and one resolved model.
#[derive(Clone)]
pub struct Assistant {
    gemini: Arc<GeminiClient>,
    resolver: Arc<ModelResolver<GeminiClient>>,
}

impl Assistant {
    pub fn new(gemini: Arc<GeminiClient>, resolver: Arc<ModelResolver<GeminiClient>>) -> Self {
        Self { gemini, resolver }
    }

    pub async fn model_status(&self) -> ModelStatus {
        let resolved = self.resolver.resolve().await;
        ModelStatus {
            model: resolved.model.clone(),
            resolution: resolved.resolution.clone(),
        }
    }

    /// Polish, summarize or compliance-check typed text or an uploaded file.
    /// An uploaded file wins over typed text.
    #[instrument(skip_all, fields(request_id = %Uuid::new_v4(), task = ?request.task))]
    pub async fn process_document(
        &self,
        request: DocumentRequest,
    ) -> Result<GeneratedText, AssistantError> {
        let content = match request.file {
            Some(file) => {
                info!(file = %file.name, mime = %file.mime_type, "extracting uploaded document");
                let bytes = media::decode_base64(&file.data)?;
                let mime_type = file.mime_type;
                tokio::task::spawn_blocking(move || extractor::extract_text(&mime_type, &bytes))
                    .await??
            }
            None => request.text.unwrap_or_default(),
        };

        if content.trim().is_empty() {
            return Err(AssistantError::MissingContent);
        }

        let prompt = build_document_prompt(request.task, &content);
        self.generate(vec![Part::text(prompt)]).await
    }

    /// Identify the plant or animal in a field photo.
    #[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
    pub async fn identify_photo(&self, request: PhotoRequest) -> Result<GeneratedText, AssistantError> {
        let bytes = media::decode_base64(&request.data)?;
        let mime_type = request.mime_type;
        let image = tokio::task::spawn_blocking(move || media::prepare_image(&mime_type, bytes))
            .await??;

        self.generate(vec![
            Part::text(PHOTO_PROMPT),
            Part::inline_image(image.mime_type, &image.bytes),
        ])
        .await
    }

    /// Draft a document from one of the fill-in-the-blank templates.
    #[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
    pub async fn draft(&self, request: DraftRequest) -> Result<DraftResponse, AssistantError> {
        let now = Utc::now().with_timezone(&LOCAL_OFFSET);
        let prompt = build_draft_prompt(&request, &now.format("%Y-%m-%d").to_string());
        let generated = self.generate(vec![Part::text(prompt)]).await?;

        Ok(DraftResponse {
            model: generated.model,
            text: generated.text,
            filename: DRAFT_FILENAME.to_string(),
            generated_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
    }

    async fn generate(&self, parts: Vec<Part>) -> Result<GeneratedText, AssistantError> {
        let model = self.resolver.model().await;

        match self.gemini.generate_content(model, &parts).await {
            Ok(text) => {
                info!(model, result = %truncate_for_log(&text, 60), "generation succeeded");
                Ok(GeneratedText {
                    model: model.to_string(),
                    text,
                })
            }
            Err(e) => {
                warn!(model, error = %e, rate_limited = e.is_rate_limited(), "generation failed");
                Err(e.into())
            }
        }
    }
}
