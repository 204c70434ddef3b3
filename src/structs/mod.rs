pub mod models;
pub mod question;
pub mod quiz_type;
pub mod submit;
