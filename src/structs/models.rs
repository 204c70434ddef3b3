use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::structs::quiz_type::{
    AttemptId, AttemptQuestionId, CategoryId, ChoiceId, PlayerId, PlayerUuid, QuestionId,
};

/// 题型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum QuestionType {
    Text,
    Single,
    #[serde(alias = "multiple")]
    Multi,
    Numeric,
    Image,
}

impl QuestionType {
    /// 单选和多选按选项ID判分
    pub fn is_choice(self) -> bool {
        matches!(self, QuestionType::Single | QuestionType::Multi)
    }
}

/// 难度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[serde(rename = "med", alias = "medium")]
    #[sqlx(rename = "med")]
    Medium,
    Hard,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// 分类列表中附带题目数量
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CategorySummary {
    pub id: CategoryId,
    pub name: String,
    pub question_count: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct Question {
    pub id: QuestionId,
    pub prompt: String,
    pub qtype: QuestionType,
    pub category_id: Option<CategoryId>,
    pub difficulty: Difficulty,
    pub text_answer: Option<String>,
    pub numeric_answer: Option<f64>,
    pub image_required: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Choice {
    pub id: ChoiceId,
    #[serde(skip_serializing)]
    pub question_id: QuestionId,
    pub text: String,
    pub is_correct: bool,
}

/// 题目连同选项的对外表示
#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub prompt: String,
    pub qtype: QuestionType,
    pub category: Option<CategoryId>,
    pub difficulty: Difficulty,
    pub text_answer: Option<String>,
    pub numeric_answer: Option<f64>,
    pub image_required: bool,
    pub choices: Vec<Choice>,
}

impl QuestionView {
    pub fn new(question: Question, choices: Vec<Choice>) -> Self {
        QuestionView {
            id: question.id,
            prompt: question.prompt,
            qtype: question.qtype,
            category: question.category_id,
            difficulty: question.difficulty,
            text_answer: question.text_answer,
            numeric_answer: question.numeric_answer,
            image_required: question.image_required,
            choices,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Player {
    pub id: PlayerId,
    pub player_uuid: PlayerUuid,
}

#[derive(Debug, Clone, FromRow)]
pub struct Attempt {
    pub id: AttemptId,
    pub player_id: PlayerId,
    pub created_at: String,
    pub score: i64,
    pub total: i64,
}

/// 答卷中冻结的一道题及玩家作答
#[derive(Debug, Clone, FromRow)]
pub struct AttemptQuestion {
    pub id: AttemptQuestionId,
    pub attempt_id: AttemptId,
    pub question_id: QuestionId,
    pub prompt: String,
    pub qtype: QuestionType,
    pub text_response: Option<String>,
    pub numeric_response: Option<f64>,
    /// 相对于media_root的图片路径
    pub image: Option<String>,
    pub image_size: Option<i64>,
    pub selected_choice_ids: Json<Vec<ChoiceId>>,
    pub is_correct: bool,
    pub correct_choice_ids: Json<Vec<ChoiceId>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_accept_aliases() {
        let multi: QuestionType = serde_json::from_str("\"multiple\"").unwrap();
        assert_eq!(multi, QuestionType::Multi);
        assert_eq!(serde_json::to_string(&multi).unwrap(), "\"multi\"");

        let medium: Difficulty = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(medium, Difficulty::Medium);
        assert_eq!(serde_json::to_string(&medium).unwrap(), "\"med\"");
    }

    #[test]
    fn choice_hides_owner_on_the_wire() {
        let choice = Choice {
            id: 3,
            question_id: 9,
            text: "Blue".to_string(),
            is_correct: true,
        };
        let value = serde_json::to_value(&choice).unwrap();
        assert_eq!(value, serde_json::json!({"id": 3, "text": "Blue", "is_correct": true}));
    }
}
