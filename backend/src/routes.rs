use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use serde::Deserialize;
use shared::{ErrorResponse, HealthResponse};
use std::path::PathBuf;
use uuid::Uuid;

use crate::detector::lifecycle::DetectorService;
use crate::detector::normalizer::{self, DecodeError, ImageSample};

pub const ALLOWED_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/bmp",
];

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

type Service = web::Data<&'static DetectorService>;

#[derive(Debug, Deserialize)]
pub struct FilePathQuery {
    pub image_path: String,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(root)))
        .service(web::resource("/health").route(web::get().to(health_check)))
        .service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/predict/file").route(web::post().to(predict_from_path)));
}

fn error_body(error: &str, message: impl Into<String>) -> ErrorResponse {
    ErrorResponse {
        error: error.to_string(),
        message: message.into(),
        allowed_types: None,
    }
}

fn decode_failure(e: &DecodeError) -> HttpResponse {
    match e {
        DecodeError::Empty => HttpResponse::BadRequest().json(error_body(
            "Empty file",
            "The uploaded file is empty. Please select a valid image.",
        )),
        other => HttpResponse::BadRequest().json(error_body("Invalid image", other.to_string())),
    }
}

/// Decodes on the blocking pool; the error side is the response to send.
async fn decode_upload(request_id: Uuid, bytes: Vec<u8>) -> Result<ImageSample, HttpResponse> {
    match web::block(move || normalizer::normalize(&bytes)).await {
        Ok(Ok(sample)) => Ok(sample),
        Ok(Err(e)) => {
            warn!("[{}] Could not decode image: {}", request_id, e);
            Err(decode_failure(&e))
        }
        Err(e) => {
            error!("[{}] Decoding task failed: {}", request_id, e);
            Err(HttpResponse::InternalServerError().json(error_body(
                "Prediction failed",
                "Internal error while reading the image",
            )))
        }
    }
}

async fn root(service: Service) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".into(),
        service: Some("Astitva AI".into()),
        description: Some("AI-powered photo authenticity checker".into()),
        primary_classifier: Some(service.config().available),
    })
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".into(),
        service: None,
        description: None,
        primary_classifier: None,
    })
}

async fn predict(service: Service, mut payload: Multipart) -> Result<HttpResponse, Error> {
    let request_id = Uuid::new_v4();
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(mut field) = payload.try_next().await? {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default();

        if !ALLOWED_TYPES.contains(&content_type.as_str()) {
            warn!("[{}] Rejected upload with content type {:?}", request_id, content_type);
            return Ok(HttpResponse::BadRequest().json(ErrorResponse {
                error: "Invalid file type".into(),
                message: format!(
                    "File type {} not supported. Please upload JPEG, PNG, WebP, GIF, or BMP.",
                    content_type
                ),
                allowed_types: Some(ALLOWED_TYPES.iter().map(|t| t.to_string()).collect()),
            }));
        }

        let mut image_data = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk?;
            if image_data.len() + data.len() > MAX_UPLOAD_BYTES {
                return Ok(HttpResponse::PayloadTooLarge().json(error_body(
                    "File too large",
                    "Images must be 50 MiB or smaller.",
                )));
            }
            image_data.extend_from_slice(&data);
        }

        upload = Some((content_type, image_data));
        break;
    }

    let Some((content_type, image_data)) = upload else {
        return Ok(HttpResponse::BadRequest().json(error_body(
            "Missing file",
            "Send the image as a multipart field named \"file\".",
        )));
    };

    info!(
        "[{}] Received {} upload ({} bytes)",
        request_id,
        content_type,
        image_data.len()
    );

    let sample = match decode_upload(request_id, image_data).await {
        Ok(sample) => sample,
        Err(response) => return Ok(response),
    };

    let outcome = service.detector().detect(&sample).await;
    info!(
        "[{}] {} with confidence {:.2} via {}",
        request_id,
        outcome.label(),
        outcome.confidence(),
        outcome.source()
    );

    Ok(HttpResponse::Ok().json(outcome.to_response(Some(sample.metadata()))))
}

async fn predict_from_path(service: Service, query: web::Query<FilePathQuery>) -> HttpResponse {
    let request_id = Uuid::new_v4();
    let path = PathBuf::from(&query.image_path);
    if !path.exists() {
        return HttpResponse::NotFound().json(error_body(
            "Not found",
            "Image file not found",
        ));
    }

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("[{}] Failed to read {}: {}", request_id, path.display(), e);
            return HttpResponse::InternalServerError().json(error_body(
                "Prediction failed",
                e.to_string(),
            ));
        }
    };

    let sample = match decode_upload(request_id, bytes).await {
        Ok(sample) => sample,
        Err(response) => return response,
    };

    let outcome = service.detector().detect(&sample).await;
    info!(
        "[{}] Analyzed {} ({}x{}): {}",
        request_id,
        path.display(),
        sample.width(),
        sample.height(),
        outcome.label()
    );
    HttpResponse::Ok().json(outcome.to_response(None))
}
