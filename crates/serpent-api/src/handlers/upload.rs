//! Browser upload form and multipart intake.
//!
//! The request body is streamed through the multipart scanner straight into
//! temporary files in the upload directory, so memory use does not grow
//! with the upload size. Nothing replaces its destination until the whole
//! body has been received and every part accepted.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{Html, IntoResponse, Response},
};
use futures::StreamExt;
use serpent_core::{
    multipart::boundary_from_content_type, CoreError, FileSink, MultipartScanner, ScanEvent,
};
use tracing::{debug, info, instrument, warn, Span};

use crate::{error::ApiError, state::UploadState};

const UPLOAD_FORM: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Upload</title></head>
<body>
<h2>📤 Upload File</h2>
<form method="POST" enctype="multipart/form-data">
    <input type="file" name="file" required>
    <button type="submit">Upload</button>
</form>
</body>
</html>
"#;

/// A file written to the upload directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Name as supplied by the client
    pub filename: String,
    /// Bytes written
    pub bytes: u64,
}

/// Serves the upload form.
pub async fn upload_form() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

/// Routes requests outside the known paths: `GET` shows the form, `POST`
/// uploads, anything else is not found.
pub async fn upload_fallback(
    method: Method,
    state: State<UploadState>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    match method {
        Method::GET => upload_form().await.into_response(),
        Method::POST => upload_file(state, headers, body).await,
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Handles a multipart upload.
#[instrument(
    name = "upload_file",
    skip(state, headers, body),
    fields(files = tracing::field::Empty, bytes = tracing::field::Empty)
)]
pub async fn upload_file(
    State(state): State<UploadState>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    match receive_files(&state, &headers, body).await {
        Ok(files) => {
            let total: u64 = files.iter().map(|f| f.bytes).sum();
            Span::current().record("files", files.len()).record("bytes", total);
            info!(names = ?files.iter().map(|f| f.filename.as_str()).collect::<Vec<_>>(), "Upload stored");
            (StatusCode::OK, Html(confirmation_page(&files))).into_response()
        },
        Err(e) => {
            warn!(code = e.code(), error = %e, "Upload rejected");
            e.into_response()
        },
    }
}

/// Streams `body` into the upload directory.
///
/// # Errors
///
/// Returns a client error for a bad content type, malformed framing, an
/// unsafe filename, a body without file parts, or one over the size limit,
/// and a server error if the file cannot be written.
pub async fn receive_files(
    state: &UploadState,
    headers: &HeaderMap,
    body: Body,
) -> Result<Vec<StoredFile>, ApiError> {
    let content_type =
        headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or_default();
    let boundary = boundary_from_content_type(content_type).map_err(CoreError::from)?;

    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > state.max_body_bytes) {
        return Err(ApiError::PayloadTooLarge { limit: state.max_body_bytes });
    }

    let mut intake = Intake {
        scanner: MultipartScanner::new(&boundary),
        current: None,
        received: Vec::new(),
    };
    let mut stream = body.into_data_stream();
    let mut body_bytes: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ApiError::Body(e.to_string()))?;
        body_bytes += chunk.len() as u64;
        if body_bytes > state.max_body_bytes {
            return Err(ApiError::PayloadTooLarge { limit: state.max_body_bytes });
        }

        intake.scanner.push(&chunk);
        intake.drain(state).await?;
        if intake.scanner.is_finished() {
            break;
        }
    }

    intake.scanner.finish().map_err(CoreError::from)?;
    if intake.received.is_empty() {
        return Err(CoreError::MissingFile.into());
    }

    let mut stored = Vec::with_capacity(intake.received.len());
    for (filename, sink) in intake.received {
        let bytes = sink.commit().await?;
        info!(%filename, bytes, "File stored");
        stored.push(StoredFile { filename, bytes });
    }
    Ok(stored)
}

/// Scanner, the file currently being written and the completed files
/// waiting to be committed.
struct Intake {
    scanner: MultipartScanner,
    current: Option<(String, FileSink)>,
    received: Vec<(String, FileSink)>,
}

impl Intake {
    async fn drain(&mut self, state: &UploadState) -> Result<(), ApiError> {
        while let Some(event) = self.scanner.next_event().map_err(CoreError::from)? {
            match event {
                ScanEvent::PartStart(part) => {
                    // Browsers send an empty filename when no file was chosen.
                    self.current = match part.filename {
                        Some(name) if !name.is_empty() => {
                            let sink = FileSink::create(&state.upload_dir, &name).await?;
                            debug!(filename = %name, field = ?part.name, "Receiving file");
                            Some((name, sink))
                        },
                        _ => None,
                    };
                },
                ScanEvent::Data(bytes) => {
                    if let Some((_, sink)) = self.current.as_mut() {
                        sink.write(&bytes).await?;
                    }
                },
                ScanEvent::PartEnd => {
                    if let Some(part) = self.current.take() {
                        self.received.push(part);
                    }
                },
                ScanEvent::End => {},
            }
        }
        Ok(())
    }
}

fn confirmation_page(files: &[StoredFile]) -> String {
    let items: String = files
        .iter()
        .map(|f| format!("<li>✅ Uploaded: {} ({} bytes)</li>", escape_html(&f.filename), f.bytes))
        .collect();
    format!(
        "<!DOCTYPE html>\n<html><body><h2>✅ Upload complete</h2><ul>{items}</ul>\
         <a href=\"/\">Upload another</a></body></html>\n"
    )
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_escapes_filenames() {
        let page = confirmation_page(&[StoredFile { filename: "<b>x</b>.png".into(), bytes: 3 }]);
        assert!(page.contains("&lt;b&gt;x&lt;/b&gt;.png (3 bytes)"));
        assert!(!page.contains("<b>x"));
    }

    #[test]
    fn form_posts_multipart() {
        assert!(UPLOAD_FORM.contains(r#"enctype="multipart/form-data""#));
        assert!(UPLOAD_FORM.contains(r#"name="file""#));
    }
}
