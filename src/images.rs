use axum::extract::Extension;
use axum::Json;

use crate::error::AppError;
use crate::storage::Storage;

/// Stored image names as a JSON array, oldest-modified first.
pub async fn list_images(
    Extension(storage): Extension<Storage>,
) -> Result<Json<Vec<String>>, AppError> {
    let images = storage.list_images().await?;
    Ok(Json(images))
}
