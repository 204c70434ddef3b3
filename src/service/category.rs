use actix_web::{web, HttpResponse};

use crate::error::QuizError;
use crate::sql_server::SqlServerHandle;
use crate::structs::question::CategoryPayload;
use crate::structs::quiz_type::CategoryId;

pub(crate) async fn list(sql_server: web::Data<SqlServerHandle>) -> Result<HttpResponse, QuizError> {
    Ok(HttpResponse::Ok().json(sql_server.list_categories().await?))
}

pub(crate) async fn create(
    req_body: web::Json<CategoryPayload>,
    sql_server: web::Data<SqlServerHandle>,
) -> Result<HttpResponse, QuizError> {
    let category = sql_server.create_category(req_body.into_inner()).await?;
    Ok(HttpResponse::Created().json(category))
}

pub(crate) async fn retrieve(
    path: web::Path<CategoryId>,
    sql_server: web::Data<SqlServerHandle>,
) -> Result<HttpResponse, QuizError> {
    Ok(HttpResponse::Ok().json(sql_server.get_category(path.into_inner()).await?))
}

pub(crate) async fn rename(
    path: web::Path<CategoryId>,
    req_body: web::Json<CategoryPayload>,
    sql_server: web::Data<SqlServerHandle>,
) -> Result<HttpResponse, QuizError> {
    let category = sql_server
        .rename_category(path.into_inner(), req_body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(category))
}

// 删除分类，题目保留但不再属于任何分类
pub(crate) async fn delete(
    path: web::Path<CategoryId>,
    sql_server: web::Data<SqlServerHandle>,
) -> Result<HttpResponse, QuizError> {
    sql_server.delete_category(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
