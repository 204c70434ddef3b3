// 数据库自增主键
pub type CategoryId = i64;
pub type QuestionId = i64;
pub type ChoiceId = i64;
pub type PlayerId = i64;
pub type AttemptId = i64;
pub type AttemptQuestionId = i64;
// 客户端生成的玩家UUID
pub type PlayerUuid = String;
// 准备连接的db文件
pub type SqlFile = String;
