use serde::{Deserialize, Serialize};

use crate::structs::models::{Choice, QuestionType};
use crate::structs::quiz_type::{
    AttemptId, AttemptQuestionId, ChoiceId, PlayerUuid, QuestionId,
};

// 开始答题的请求体
#[derive(Deserialize, Debug)]
pub struct StartRequest {
    pub player_uuid: Option<String>,
}

// 查询答题记录的参数
#[derive(Deserialize, Debug)]
pub struct AttemptsQuery {
    pub player_uuid: Option<String>,
}

/// 答卷的对外表示，开始答题和提交答案都返回它
#[derive(Serialize, Debug, Clone)]
pub struct AttemptView {
    pub id: AttemptId,
    pub player_uuid: PlayerUuid,
    pub created_at: String,
    pub score: i64,
    pub total: i64,
    pub attempt_questions: Vec<AttemptQuestionView>,
}

#[derive(Serialize, Debug, Clone)]
pub struct AttemptQuestionView {
    pub id: AttemptQuestionId,
    pub question_id: QuestionId,
    pub prompt: String,
    pub qtype: QuestionType,
    pub selected_choice_ids: Vec<ChoiceId>,
    pub text_response: Option<String>,
    pub numeric_response: Option<f64>,
    /// 图片的访问url
    pub image: Option<String>,
    pub is_correct: bool,
    pub correct_choice_ids: Vec<ChoiceId>,
    pub choices: Vec<Choice>,
}
