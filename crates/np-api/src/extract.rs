//! Request body extraction shared by create and update routes.
//!
//! Bodies arrive either as JSON or as `multipart/form-data` with text fields
//! plus an optional image part.

use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::Json;
use np_core::error::AppError;
use np_core::form::FormFields;
use np_core::models::Upload;
use np_core::traits::Payload;

use crate::error::ApiError;

/// A decoded payload together with the uploaded file, if any.
#[derive(Debug)]
pub struct Submission<P> {
    pub payload: P,
    pub upload: Option<Upload>,
}

impl<S, P> FromRequest<S> for Submission<P>
where
    S: Send + Sync,
    P: Payload,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
            read_multipart(multipart).await
        } else {
            let Json(payload) = Json::<P>::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            Ok(Self { payload, upload: None })
        }
    }
}

async fn read_multipart<P: Payload>(mut multipart: Multipart) -> Result<Submission<P>, ApiError> {
    let mut form = FormFields::new();
    let mut upload: Option<Upload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        // A part with a file name under an upload field is the image; a plain
        // `photo` text field is a reference to an existing image.
        if let Some(file_name) = field.file_name().map(str::to_string) {
            if !P::UPLOAD_FIELDS.contains(&name.as_str()) {
                return Err(AppError::validation(format!("unexpected file field '{name}'")).into());
            }
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
            let part = Upload::new(file_name, content_type, bytes);
            if part.is_empty() {
                continue;
            }
            if upload.is_some() {
                return Err(AppError::validation("only one image may be uploaded").into());
            }
            upload = Some(part);
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
            form.insert(name, text)?;
        }
    }

    let payload = P::from_form(form)?;
    Ok(Submission { payload, upload })
}
