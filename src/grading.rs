use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;

use crate::matcher;
use crate::structs::models::{AttemptQuestion, Question, QuestionType};
use crate::structs::quiz_type::ChoiceId;

/// 文本题判为正确所需的最低相似度
pub const TEXT_SIMILARITY_THRESHOLD: f64 = 0.85;
/// 数值题允许的绝对误差
pub const NUMERIC_TOLERANCE: f64 = 1e-6;

/// 题目的标准答案
#[derive(Debug, Clone, Copy)]
pub struct AnswerKey<'a> {
    pub text_answer: Option<&'a str>,
    pub numeric_answer: Option<f64>,
    pub image_required: bool,
    pub correct_choice_ids: &'a [ChoiceId],
}

impl<'a> AnswerKey<'a> {
    pub fn new(question: &'a Question, correct_choice_ids: &'a [ChoiceId]) -> Self {
        AnswerKey {
            text_answer: question.text_answer.as_deref(),
            numeric_answer: question.numeric_answer,
            image_required: question.image_required,
            correct_choice_ids,
        }
    }
}

/// 玩家对一道题的作答
#[derive(Debug, Clone, Copy, Default)]
pub struct Response<'a> {
    pub text_response: Option<&'a str>,
    pub numeric_response: Option<f64>,
    pub selected_choice_ids: &'a [ChoiceId],
    /// 提交了图片时为图片字节数
    pub image_size: Option<i64>,
}

impl<'a> From<&'a AttemptQuestion> for Response<'a> {
    fn from(aq: &'a AttemptQuestion) -> Self {
        let has_image = aq.image.as_deref().map_or(false, |path| !path.is_empty());
        Response {
            text_response: aq.text_response.as_deref(),
            numeric_response: aq.numeric_response,
            selected_choice_ids: &aq.selected_choice_ids.0,
            image_size: has_image.then(|| aq.image_size.unwrap_or(0)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub is_correct: bool,
    /// 选择题重新记录的正确选项，其他题型为None
    pub correct_choice_ids: Option<Vec<ChoiceId>>,
}

/// 按题型判分，同样的输入总是得到同样的结果
pub fn grade(qtype: QuestionType, response: &Response, key: &AnswerKey) -> Verdict {
    match qtype {
        QuestionType::Single | QuestionType::Multi => {
            let selected: HashSet<ChoiceId> = response.selected_choice_ids.iter().copied().collect();
            let correct: HashSet<ChoiceId> = key.correct_choice_ids.iter().copied().collect();
            Verdict {
                is_correct: selected == correct,
                correct_choice_ids: Some(key.correct_choice_ids.to_vec()),
            }
        }
        QuestionType::Numeric => Verdict {
            is_correct: match (response.numeric_response, key.numeric_answer) {
                (Some(given), Some(expected)) => numeric_equal(given, expected),
                _ => false,
            },
            correct_choice_ids: None,
        },
        QuestionType::Text => Verdict {
            is_correct: match (response.text_response, key.text_answer) {
                (Some(given), Some(expected)) if !given.is_empty() && !expected.is_empty() => {
                    fuzzy_equal(given, expected)
                }
                _ => false,
            },
            correct_choice_ids: None,
        },
        QuestionType::Image => Verdict {
            is_correct: match response.image_size {
                Some(size) => !key.image_required || size > 0,
                None => false,
            },
            correct_choice_ids: None,
        },
    }
}

pub fn numeric_equal(given: f64, expected: f64) -> bool {
    (given - expected).abs() <= NUMERIC_TOLERANCE
}

/// 去掉首尾空白、转小写、NFKC规范化，再把连续空白压成一个空格
pub fn norm_text(s: &str) -> String {
    let folded: String = s.trim().to_lowercase().nfkc().collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn fuzzy_equal(a: &str, b: &str) -> bool {
    matcher::ratio(&norm_text(a), &norm_text(b)) >= TEXT_SIMILARITY_THRESHOLD
}
