mod detector;
mod routes;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use detector::config::Settings;
use detector::lifecycle;
use routes::configure_routes;
use std::env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    // Build the detector before any worker can race for it.
    log::info!("Loading detector...");
    let settings = Settings::from_env();
    let detector = lifecycle::init(&settings);
    let config = detector.config();
    if config.available {
        log::info!("Detector ready (Gemini primary, heuristic fallback)");
    } else if config.credential_present {
        log::warn!("Detector ready (heuristics only: Gemini client could not be built)");
    } else {
        log::info!("Detector ready (heuristics only)");
    }

    let port = env::var("PORT").unwrap_or_else(|_| "8000".to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(detector))
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
