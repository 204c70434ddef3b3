use actix_web::{web, HttpRequest, HttpResponse};
use uuid::Uuid;

use crate::config::Config;
use crate::error::QuizError;
use crate::service::upload::{read_submission, save_image};
use crate::sql_server::SqlServerHandle;
use crate::structs::quiz_type::AttemptId;
use crate::structs::submit::{AttemptsQuery, StartRequest};

// 开始答题，为玩家随机抽题
pub(crate) async fn start(
    req_body: web::Json<StartRequest>,
    sql_server: web::Data<SqlServerHandle>,
) -> Result<HttpResponse, QuizError> {
    let player_uuid = req_body
        .into_inner()
        .player_uuid
        .map(|uuid| uuid.trim().to_string())
        .filter(|uuid| !uuid.is_empty())
        .ok_or_else(|| QuizError::BadRequest("player_uuid is required".to_string()))?;
    let player_uuid = Uuid::parse_str(&player_uuid)
        .map_err(|_| QuizError::BadRequest(format!("'{}' is not a valid UUID.", player_uuid)))?;

    let attempt = sql_server.start_attempt(player_uuid.to_string()).await?;
    Ok(HttpResponse::Created().json(attempt))
}

// 提交答卷并进行打分
pub(crate) async fn submit(
    req: HttpRequest,
    path: web::Path<AttemptId>,
    payload: web::Payload,
    sql_server: web::Data<SqlServerHandle>,
    config: web::Data<Config>,
) -> Result<HttpResponse, QuizError> {
    let attempt_id = path.into_inner();
    // 答卷不存在时不读取请求体，也不落盘图片
    sql_server.get_attempt(attempt_id).await?;

    let (submission, image) = read_submission(&req, payload, config.max_body_bytes).await;
    let answers = submission.into_answers();
    let image = match image {
        Some(image) => save_image(&config.answers_dir(), image).await,
        None => None,
    };

    let attempt = sql_server.submit_attempt(attempt_id, answers, image).await?;
    Ok(HttpResponse::Ok().json(attempt))
}

// 玩家的答题记录，未提供或无法识别的player_uuid返回空列表
pub(crate) async fn list_attempts(
    query: web::Query<AttemptsQuery>,
    sql_server: web::Data<SqlServerHandle>,
) -> Result<HttpResponse, QuizError> {
    let player_uuid = query
        .into_inner()
        .player_uuid
        .and_then(|uuid| Uuid::parse_str(uuid.trim()).ok());
    let attempts = match player_uuid {
        Some(uuid) => sql_server.list_attempts(uuid.to_string()).await?,
        None => Vec::new(),
    };
    Ok(HttpResponse::Ok().json(attempts))
}

pub(crate) async fn get_attempt(
    path: web::Path<AttemptId>,
    sql_server: web::Data<SqlServerHandle>,
) -> Result<HttpResponse, QuizError> {
    let attempt = sql_server.get_attempt(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(attempt))
}

pub(crate) async fn delete_attempt(
    path: web::Path<AttemptId>,
    sql_server: web::Data<SqlServerHandle>,
) -> Result<HttpResponse, QuizError> {
    sql_server.delete_attempt(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// 删除玩家及其全部答卷
pub(crate) async fn delete_player(
    path: web::Path<String>,
    sql_server: web::Data<SqlServerHandle>,
) -> Result<HttpResponse, QuizError> {
    let player_uuid = Uuid::parse_str(path.trim()).map_err(|_| QuizError::NotFound("player"))?;
    sql_server.delete_player(player_uuid.to_string()).await?;
    Ok(HttpResponse::NoContent().finish())
}
