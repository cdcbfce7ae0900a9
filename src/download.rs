use axum::extract::{Extension, Path};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::storage::Storage;

/// Serves a stored file by name, with the content type inferred from the
/// filename. Unknown names are 404; names that would escape the upload
/// directory never reach the filesystem.
pub async fn download_file(
    Extension(storage): Extension<Storage>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    if !storage.exists(&filename)? {
        return Err(AppError::NotFound);
    }
    let contents = storage.read(&filename).await?;
    let mime_type = mime_guess::from_path(&filename).first_or_octet_stream();
    Ok(([(header::CONTENT_TYPE, mime_type.as_ref())], contents).into_response())
}
