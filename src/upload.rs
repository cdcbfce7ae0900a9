use axum::body::Bytes;
use axum::extract::{Extension, FromRequest, Multipart, Request};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use chrono::Utc;

use crate::error::AppError;
use crate::storage::Storage;

/// Header carrying the desired filename for raw octet-stream uploads.
/// Wire-compatible with existing clients, as is the fallback name below.
pub const FILENAME_HEADER: &str = "x-filename";

pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Accepts either a `multipart/form-data` body with a `file` field or a raw
/// `application/octet-stream` body named by the `x-filename` header. Both
/// shapes funnel into the same non-overwriting write.
pub async fn upload_file(
    Extension(storage): Extension<Storage>,
    req: Request,
) -> Result<String, AppError> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let content_length = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_string();
    tracing::info!(%content_type, %content_length, "upload request");

    let (filename, data) = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(req, &())
            .await
            .map_err(|err| AppError::bad_request(format!("invalid multipart body: {err}")))?;
        file_from_multipart(multipart).await?
    } else {
        file_from_raw(req).await?
    };

    let size = storage.write_new(&filename, &data).await?;
    tracing::info!(file = %filename, size, "stored upload");
    Ok(format!(
        "File uploaded successfully: {filename} ({size} bytes)"
    ))
}

async fn file_from_multipart(mut multipart: Multipart) -> Result<(String, Bytes), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart body: {err}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(AppError::bad_request("no selected file"));
        }
        let data = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(format!("failed to read upload: {err}")))?;
        return Ok((filename, data));
    }
    Err(AppError::bad_request("no file part"))
}

async fn file_from_raw(req: Request) -> Result<(String, Bytes), AppError> {
    let filename = match req
        .headers()
        .get(FILENAME_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("photo_{}.jpg", Utc::now().timestamp()),
    };
    let data = axum::body::to_bytes(req.into_body(), MAX_UPLOAD_BYTES)
        .await
        .map_err(|err| AppError::bad_request(format!("failed to read body: {err}")))?;
    Ok((filename, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tempfile::tempdir;

    fn make_storage() -> (tempfile::TempDir, Storage) {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::open(temp.path().join("uploads")).expect("open storage");
        (temp, storage)
    }

    fn multipart_request(field_name: &str, filename: &str, data: &str) -> Request {
        let boundary = "test-boundary";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"{field_name}\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             {data}\r\n\
             --{boundary}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn raw_request(filename: Option<&str>, data: &'static [u8]) -> Request {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(CONTENT_TYPE, "application/octet-stream");
        if let Some(name) = filename {
            builder = builder.header(FILENAME_HEADER, name);
        }
        builder.body(Body::from(data)).unwrap()
    }

    #[tokio::test]
    async fn multipart_upload_stores_declared_filename() {
        let (_temp, storage) = make_storage();
        let req = multipart_request("file", "a.jpg", "jpeg bytes");
        let message = upload_file(Extension(storage.clone()), req).await.unwrap();
        assert!(message.contains("a.jpg"));
        assert_eq!(storage.read("a.jpg").await.unwrap(), b"jpeg bytes");
    }

    #[tokio::test]
    async fn multipart_without_file_field_is_bad_request() {
        let (_temp, storage) = make_storage();
        let req = multipart_request("attachment", "a.jpg", "bytes");
        let err = upload_file(Extension(storage), req).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn multipart_with_empty_filename_is_bad_request() {
        let (_temp, storage) = make_storage();
        let req = multipart_request("file", "", "bytes");
        let err = upload_file(Extension(storage), req).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn duplicate_upload_is_conflict_and_first_bytes_win() {
        let (_temp, storage) = make_storage();
        let first = multipart_request("file", "a.jpg", "first");
        upload_file(Extension(storage.clone()), first).await.unwrap();

        let second = multipart_request("file", "a.jpg", "second");
        let err = upload_file(Extension(storage.clone()), second)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(storage.read("a.jpg").await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn raw_upload_uses_filename_header() {
        let (_temp, storage) = make_storage();
        let req = raw_request(Some("shot.png"), b"png bytes");
        upload_file(Extension(storage.clone()), req).await.unwrap();
        assert_eq!(storage.read("shot.png").await.unwrap(), b"png bytes");
    }

    #[tokio::test]
    async fn raw_upload_without_header_falls_back_to_photo_name() {
        let (_temp, storage) = make_storage();
        let req = raw_request(None, b"bytes");
        let message = upload_file(Extension(storage.clone()), req).await.unwrap();
        assert!(message.contains("photo_"));

        let listed = storage.list_images().await.unwrap();
        assert_eq!(listed.len(), 1);
        let name = &listed[0];
        let digits = name
            .strip_prefix("photo_")
            .and_then(|rest| rest.strip_suffix(".jpg"))
            .expect("fallback name shape");
        assert!(!digits.is_empty());
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn traversal_filename_is_rejected() {
        let (_temp, storage) = make_storage();
        let req = raw_request(Some("../escape.jpg"), b"bytes");
        let err = upload_file(Extension(storage), req).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
