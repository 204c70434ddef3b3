use serde::{Deserialize, Deserializer};

use crate::error::QuizError;
use crate::structs::models::{Choice, Difficulty, Question, QuestionType};
use crate::structs::quiz_type::{CategoryId, ChoiceId};

/// 配合serde的`deserialize_with`使用，区分“字段缺省”和“显式传入null”
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChoicePayload {
    /// 客户端可能回传旧ID，替换选项时忽略
    #[serde(default)]
    pub id: Option<ChoiceId>,
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// 新建、整体替换和部分更新题目共用的请求体
#[derive(Deserialize, Debug, Default)]
pub struct QuestionPayload {
    pub prompt: Option<String>,
    pub qtype: Option<QuestionType>,
    #[serde(default, deserialize_with = "double_option")]
    pub category: Option<Option<CategoryId>>,
    pub difficulty: Option<Difficulty>,
    #[serde(default, deserialize_with = "double_option")]
    pub text_answer: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub numeric_answer: Option<Option<f64>>,
    pub image_required: Option<bool>,
    pub choices: Option<Vec<ChoicePayload>>,
}

/// 校验前的题目有效值
#[derive(Debug, Clone)]
pub struct QuestionDraft {
    pub prompt: String,
    pub qtype: QuestionType,
    pub category_id: Option<CategoryId>,
    pub difficulty: Difficulty,
    pub text_answer: Option<String>,
    pub numeric_answer: Option<f64>,
    pub image_required: bool,
    /// None表示保留已有选项
    pub choices: Option<Vec<ChoicePayload>>,
}

impl QuestionPayload {
    /// 新建或PUT：必填字段缺失时报错，其余字段取默认值
    pub fn into_draft(self) -> Result<QuestionDraft, QuizError> {
        let prompt = self.prompt.ok_or_else(|| required("prompt"))?;
        let qtype = self.qtype.ok_or_else(|| required("qtype"))?;
        let difficulty = self.difficulty.ok_or_else(|| required("difficulty"))?;
        Ok(QuestionDraft {
            prompt,
            qtype,
            category_id: self.category.flatten(),
            difficulty,
            text_answer: self.text_answer.flatten(),
            numeric_answer: self.numeric_answer.flatten(),
            image_required: self.image_required.unwrap_or(false),
            choices: self.choices,
        })
    }

    /// PATCH：请求体中的字段覆盖已存储的值
    pub fn merge_into(self, current: &Question) -> QuestionDraft {
        QuestionDraft {
            prompt: self.prompt.unwrap_or_else(|| current.prompt.clone()),
            qtype: self.qtype.unwrap_or(current.qtype),
            category_id: self.category.unwrap_or(current.category_id),
            difficulty: self.difficulty.unwrap_or(current.difficulty),
            text_answer: self
                .text_answer
                .unwrap_or_else(|| current.text_answer.clone()),
            numeric_answer: self.numeric_answer.unwrap_or(current.numeric_answer),
            image_required: self.image_required.unwrap_or(current.image_required),
            choices: self.choices,
        }
    }
}

fn required(field: &str) -> QuizError {
    QuizError::BadRequest(format!("'{}' is required.", field))
}

impl QuestionDraft {
    /// 按题型检查答案是否完整，existing为题目当前已存储的选项
    pub fn validate(&self, existing: &[Choice]) -> Result<(), QuizError> {
        if self.prompt.trim().is_empty() {
            return Err(QuizError::BadRequest("'prompt' must not be empty.".to_string()));
        }

        if self.qtype.is_choice() {
            let correct_flags: Vec<bool> = match &self.choices {
                Some(choices) => choices.iter().map(|c| c.is_correct).collect(),
                None => existing.iter().map(|c| c.is_correct).collect(),
            };
            if correct_flags.is_empty() {
                return Err(QuizError::BadRequest(
                    "Choice questions must include at least one choice.".to_string(),
                ));
            }
            let correct_count = correct_flags.iter().filter(|c| **c).count();
            if self.qtype == QuestionType::Single && correct_count != 1 {
                return Err(QuizError::BadRequest(
                    "Single-choice question must have exactly one correct choice.".to_string(),
                ));
            }
            if self.qtype == QuestionType::Multi && correct_count < 1 {
                return Err(QuizError::BadRequest(
                    "Multiple-choice question must have at least one correct choice."
                        .to_string(),
                ));
            }
        }

        match self.qtype {
            QuestionType::Text
                if self.text_answer.as_deref().map_or(true, str::is_empty) =>
            {
                Err(QuizError::BadRequest(
                    "Text question requires 'text_answer'.".to_string(),
                ))
            }
            QuestionType::Numeric if self.numeric_answer.is_none() => Err(
                QuizError::BadRequest("Numeric question requires 'numeric_answer'.".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct CategoryPayload {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> QuestionPayload {
        serde_json::from_value(value).unwrap()
    }

    fn choices(flags: &[bool]) -> serde_json::Value {
        flags
            .iter()
            .enumerate()
            .map(|(i, c)| json!({"text": format!("option {}", i), "is_correct": c}))
            .collect()
    }

    #[test]
    fn single_choice_needs_exactly_one_correct() {
        for (flags, ok) in [
            (vec![false, true, false], true),
            (vec![true, true], false),
            (vec![false, false], false),
        ] {
            let draft = payload(json!({
                "prompt": "Pick one", "qtype": "single", "difficulty": "easy",
                "choices": choices(&flags),
            }))
            .into_draft()
            .unwrap();
            assert_eq!(draft.validate(&[]).is_ok(), ok, "flags {:?}", flags);
        }
    }

    #[test]
    fn multi_choice_needs_at_least_one_correct() {
        let ok = payload(json!({
            "prompt": "Pick all", "qtype": "multi", "difficulty": "hard",
            "choices": choices(&[true, false, true]),
        }))
        .into_draft()
        .unwrap();
        assert!(ok.validate(&[]).is_ok());

        let none = payload(json!({
            "prompt": "Pick all", "qtype": "multiple", "difficulty": "hard",
            "choices": choices(&[false, false]),
        }))
        .into_draft()
        .unwrap();
        assert!(matches!(none.validate(&[]), Err(QuizError::BadRequest(_))));
    }

    #[test]
    fn choice_question_without_choices_is_rejected() {
        let draft = payload(json!({"prompt": "?", "qtype": "single", "difficulty": "easy"}))
            .into_draft()
            .unwrap();
        let err = draft.validate(&[]).unwrap_err();
        assert_eq!(err.to_string(), "Choice questions must include at least one choice.");
    }

    #[test]
    fn existing_choices_count_when_payload_has_none() {
        let existing = vec![Choice {
            id: 1,
            question_id: 1,
            text: "Blue".to_string(),
            is_correct: true,
        }];
        let draft = payload(json!({"prompt": "?", "qtype": "single", "difficulty": "easy"}))
            .into_draft()
            .unwrap();
        assert!(draft.validate(&existing).is_ok());
    }

    #[test]
    fn text_and_numeric_need_an_answer_key() {
        let text = payload(json!({"prompt": "?", "qtype": "text", "difficulty": "easy", "text_answer": ""}))
            .into_draft()
            .unwrap();
        assert!(text.validate(&[]).is_err());

        let numeric = payload(json!({"prompt": "?", "qtype": "numeric", "difficulty": "easy"}))
            .into_draft()
            .unwrap();
        assert!(numeric.validate(&[]).is_err());

        let numeric = payload(json!({"prompt": "?", "qtype": "numeric", "difficulty": "med", "numeric_answer": 0.0}))
            .into_draft()
            .unwrap();
        assert!(numeric.validate(&[]).is_ok());
    }

    #[test]
    fn missing_required_field_is_reported() {
        let err = payload(json!({"qtype": "text", "difficulty": "easy"}))
            .into_draft()
            .unwrap_err();
        assert_eq!(err.to_string(), "'prompt' is required.");
    }

    #[test]
    fn patch_distinguishes_null_from_absent() {
        let current = Question {
            id: 4,
            prompt: "Old".to_string(),
            qtype: QuestionType::Text,
            category_id: Some(2),
            difficulty: Difficulty::Easy,
            text_answer: Some("Paris".to_string()),
            numeric_answer: None,
            image_required: false,
        };
        let draft = payload(json!({"category": null, "prompt": "New"})).merge_into(&current);
        assert_eq!(draft.prompt, "New");
        assert_eq!(draft.category_id, None);
        assert_eq!(draft.text_answer.as_deref(), Some("Paris"));
        assert!(draft.choices.is_none());
    }
}
