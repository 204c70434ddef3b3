pub mod answers;
pub mod config;
pub mod database;
pub mod error;
pub mod grading;
pub mod matcher;
pub mod seed;
pub mod sql_server;
pub mod structs;

mod service;

use actix_web::error::JsonPayloadError;
use actix_web::{web, HttpRequest};

use crate::config::Config;
use crate::error::QuizError;
use crate::service::{category, question, quiz};

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    QuizError::BadRequest(err.to_string()).into()
}

/// 注册全部api路由，需要先在App中放入SqlServerHandle和Config
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .route("/play/start", web::post().to(quiz::start))
            .route("/play/submit/{attempt_id}", web::post().to(quiz::submit))
            .route("/attempts", web::get().to(quiz::list_attempts))
            .service(
                web::resource("/attempts/{id}")
                    .route(web::get().to(quiz::get_attempt))
                    .route(web::delete().to(quiz::delete_attempt)),
            )
            .route("/players/{player_uuid}", web::delete().to(quiz::delete_player))
            .service(
                web::resource("/questions")
                    .route(web::get().to(question::list))
                    .route(web::post().to(question::create)),
            )
            .service(
                web::resource("/questions/{id}")
                    .route(web::get().to(question::retrieve))
                    .route(web::put().to(question::replace))
                    .route(web::patch().to(question::patch))
                    .route(web::delete().to(question::delete)),
            )
            .route("/questions/{id}/choices", web::get().to(question::choices))
            .service(
                web::resource("/categories")
                    .route(web::get().to(category::list))
                    .route(web::post().to(category::create)),
            )
            .service(
                web::resource("/categories/{id}")
                    .route(web::get().to(category::retrieve))
                    .route(web::put().to(category::rename))
                    .route(web::delete().to(category::delete)),
            ),
    );
}

/// 对外提供已上传的答题图片
pub fn media_files(config: &Config) -> actix_files::Files {
    actix_files::Files::new(config.media_mount(), &config.media_root)
}
