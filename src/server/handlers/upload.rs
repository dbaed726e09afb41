use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use tracing::Instrument;

use crate::a2a::new_trace_id;
use crate::agents::UploadedFile;
use crate::core::errors::{ApiError, PipelineError, Stage, StageContext};

/// Fields of an upload form: any number of `file`/`files` parts plus an
/// optional `user_query` text part. Other parts are ignored.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<UploadedFile>,
    pub user_query: Option<String>,
}

/// Reads the form under its own trace id. A rejected form is logged with
/// the same id that its `ERROR` envelope carries.
pub async fn read_upload_form(multipart: Multipart) -> Result<UploadForm, PipelineError> {
    let trace_id = new_trace_id();
    let span = tracing::info_span!("read_upload", trace_id = %trace_id);

    async {
        let form = read_fields(multipart).await;
        match &form {
            Ok(form) => tracing::debug!(files = form.files.len(), "Upload form read"),
            Err(err) => tracing::warn!("Rejected upload form: {}", err),
        }
        form
    }
    .instrument(span)
    .await
    .stage(Stage::Ingestion, &trace_id)
}

async fn read_fields(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" | "files" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|name| !name.trim().is_empty())
                    .ok_or_else(|| ApiError::BadRequest("uploaded file has no name".to_string()))?;
                let bytes = field.bytes().await.map_err(multipart_error)?;
                form.files.push(UploadedFile::new(filename, bytes.to_vec()));
            }
            "user_query" => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.trim().is_empty() {
                    form.user_query = Some(text);
                }
            }
            other => {
                tracing::debug!("Ignoring form field '{}'", other);
            }
        }
    }

    if form.files.is_empty() {
        return Err(ApiError::BadRequest(
            "expected at least one 'file' part".to_string(),
        ));
    }
    Ok(form)
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}
