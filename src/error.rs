use std::error::Error;
use std::fmt;
use std::io;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

#[derive(Debug)]
pub enum QuizError {
    /// 客户端输入不合法
    BadRequest(String),
    /// 请求的对象不存在
    NotFound(&'static str),
    /// 对象仍被引用，拒绝删除
    Protected(String),
    Database(sqlx::Error),
    Io(io::Error),
    Config(toml::de::Error),
    Internal(String),
    /// sql_server已经退出
    ServerClosed,
}

impl fmt::Display for QuizError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QuizError::BadRequest(msg) => write!(f, "{}", msg),
            QuizError::NotFound(what) => write!(f, "{} not found", what),
            QuizError::Protected(msg) => write!(f, "{}", msg),
            QuizError::Database(e) => write!(f, "数据库错误: {}", e),
            QuizError::Io(e) => write!(f, "IO错误: {}", e),
            QuizError::Config(e) => write!(f, "配置文件格式错误: {}", e),
            QuizError::Internal(msg) => write!(f, "内部错误: {}", msg),
            QuizError::ServerClosed => write!(f, "sql_server已关闭"),
        }
    }
}

impl Error for QuizError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            QuizError::Database(e) => Some(e),
            QuizError::Io(e) => Some(e),
            QuizError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for QuizError {
    fn from(e: sqlx::Error) -> Self {
        QuizError::Database(e)
    }
}

impl From<io::Error> for QuizError {
    fn from(e: io::Error) -> Self {
        QuizError::Io(e)
    }
}

impl From<toml::de::Error> for QuizError {
    fn from(e: toml::de::Error) -> Self {
        QuizError::Config(e)
    }
}

impl ResponseError for QuizError {
    fn status_code(&self) -> StatusCode {
        match self {
            QuizError::BadRequest(_) => StatusCode::BAD_REQUEST,
            QuizError::NotFound(_) => StatusCode::NOT_FOUND,
            QuizError::Protected(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // 服务端错误只记录日志，不把细节返回给客户端
        let message = if status.is_server_error() {
            log::error!("处理请求时出错: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(json!({
            "code": status.as_u16(),
            "error": message,
        }))
    }
}
