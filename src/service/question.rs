use actix_web::{web, HttpResponse};

use crate::error::QuizError;
use crate::sql_server::SqlServerHandle;
use crate::structs::question::QuestionPayload;
use crate::structs::quiz_type::QuestionId;

pub(crate) async fn list(sql_server: web::Data<SqlServerHandle>) -> Result<HttpResponse, QuizError> {
    Ok(HttpResponse::Ok().json(sql_server.list_questions().await?))
}

pub(crate) async fn create(
    req_body: web::Json<QuestionPayload>,
    sql_server: web::Data<SqlServerHandle>,
) -> Result<HttpResponse, QuizError> {
    let question = sql_server.create_question(req_body.into_inner()).await?;
    Ok(HttpResponse::Created().json(question))
}

pub(crate) async fn retrieve(
    path: web::Path<QuestionId>,
    sql_server: web::Data<SqlServerHandle>,
) -> Result<HttpResponse, QuizError> {
    Ok(HttpResponse::Ok().json(sql_server.get_question(path.into_inner()).await?))
}

// PUT整体替换
pub(crate) async fn replace(
    path: web::Path<QuestionId>,
    req_body: web::Json<QuestionPayload>,
    sql_server: web::Data<SqlServerHandle>,
) -> Result<HttpResponse, QuizError> {
    let question = sql_server
        .update_question(path.into_inner(), req_body.into_inner(), false)
        .await?;
    Ok(HttpResponse::Ok().json(question))
}

// PATCH只修改提供的字段
pub(crate) async fn patch(
    path: web::Path<QuestionId>,
    req_body: web::Json<QuestionPayload>,
    sql_server: web::Data<SqlServerHandle>,
) -> Result<HttpResponse, QuizError> {
    let question = sql_server
        .update_question(path.into_inner(), req_body.into_inner(), true)
        .await?;
    Ok(HttpResponse::Ok().json(question))
}

pub(crate) async fn delete(
    path: web::Path<QuestionId>,
    sql_server: web::Data<SqlServerHandle>,
) -> Result<HttpResponse, QuizError> {
    sql_server.delete_question(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub(crate) async fn choices(
    path: web::Path<QuestionId>,
    sql_server: web::Data<SqlServerHandle>,
) -> Result<HttpResponse, QuizError> {
    Ok(HttpResponse::Ok().json(sql_server.list_choices(path.into_inner()).await?))
}
