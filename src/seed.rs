use sqlx::pool::Pool;
use sqlx::sqlite::Sqlite;

use crate::database;
use crate::error::QuizError;
use crate::structs::models::{Difficulty, QuestionType};
use crate::structs::question::{ChoicePayload, QuestionDraft};

struct DemoQuestion {
    prompt: &'static str,
    qtype: QuestionType,
    difficulty: Difficulty,
    text_answer: Option<&'static str>,
    numeric_answer: Option<f64>,
    image_required: bool,
    // (选项, 是否正确)
    choices: &'static [(&'static str, bool)],
}

const fn demo(prompt: &'static str, qtype: QuestionType, difficulty: Difficulty) -> DemoQuestion {
    DemoQuestion {
        prompt,
        qtype,
        difficulty,
        text_answer: None,
        numeric_answer: None,
        image_required: false,
        choices: &[],
    }
}

const DEMO_QUESTIONS: &[DemoQuestion] = &[
    DemoQuestion {
        text_answer: Some("Paris"),
        ..demo("What is the capital of France?", QuestionType::Text, Difficulty::Easy)
    },
    DemoQuestion {
        numeric_answer: Some(4.0),
        ..demo("2 + 2 = ?", QuestionType::Numeric, Difficulty::Easy)
    },
    DemoQuestion {
        image_required: true,
        ..demo("Upload a picture of anything (demo).", QuestionType::Image, Difficulty::Easy)
    },
    DemoQuestion {
        choices: &[("Green", false), ("Blue", true), ("Orange", false)],
        ..demo("Select the primary color.", QuestionType::Single, Difficulty::Easy)
    },
    DemoQuestion {
        choices: &[("1", false), ("2", true), ("3", false), ("4", true)],
        ..demo("Select all even numbers.", QuestionType::Multi, Difficulty::Easy)
    },
    DemoQuestion {
        text_answer: Some("desserts"),
        ..demo("Reverse of 'stressed'?", QuestionType::Text, Difficulty::Medium)
    },
    DemoQuestion {
        numeric_answer: Some(5.0),
        ..demo("10 / 2 = ?", QuestionType::Numeric, Difficulty::Easy)
    },
    DemoQuestion {
        choices: &[("Shark", false), ("Dolphin", true), ("Octopus", false)],
        ..demo("Pick the mammal.", QuestionType::Single, Difficulty::Medium)
    },
    DemoQuestion {
        choices: &[("2", true), ("4", false), ("5", true), ("6", false)],
        ..demo("Select all prime numbers.", QuestionType::Multi, Difficulty::Medium)
    },
    DemoQuestion {
        text_answer: Some("Earth"),
        ..demo("Name of our planet?", QuestionType::Text, Difficulty::Easy)
    },
];

/// 题库为空时写入示例题目，返回写入的题目数量
pub async fn seed_if_empty(pool: &Pool<Sqlite>) -> Result<usize, QuizError> {
    let mut tx = pool.begin().await?;
    if !database::question_ids(&mut tx).await?.is_empty() {
        log::info!("题库已有题目，跳过示例数据");
        return Ok(0);
    }

    let category = database::get_or_create_category(&mut tx, "General").await?;
    for demo in DEMO_QUESTIONS {
        let choices: Vec<ChoicePayload> = demo
            .choices
            .iter()
            .map(|(text, is_correct)| ChoicePayload {
                id: None,
                text: text.to_string(),
                is_correct: *is_correct,
            })
            .collect();
        let draft = QuestionDraft {
            prompt: demo.prompt.to_string(),
            qtype: demo.qtype,
            category_id: Some(category.id),
            difficulty: demo.difficulty,
            text_answer: demo.text_answer.map(str::to_string),
            numeric_answer: demo.numeric_answer,
            image_required: demo.image_required,
            choices: Some(choices),
        };
        draft.validate(&[])?;
        let id = database::insert_question(&mut tx, &draft).await?;
        if let Some(choices) = &draft.choices {
            database::replace_choices(&mut tx, id, choices).await?;
        }
    }
    tx.commit().await?;
    log::info!("已写入{}道示例题目", DEMO_QUESTIONS.len());
    Ok(DEMO_QUESTIONS.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeds_once() {
        let path = std::env::temp_dir().join(format!("quiz_seed_test_{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let pool = database::connect(&path.display().to_string(), 1).await.unwrap();

        assert_eq!(seed_if_empty(&pool).await.unwrap(), 10);
        assert_eq!(seed_if_empty(&pool).await.unwrap(), 0);

        let mut conn = pool.acquire().await.unwrap();
        let questions = database::list_questions(&mut conn).await.unwrap();
        assert_eq!(questions.len(), 10);
        let mammal = questions.iter().find(|q| q.prompt == "Pick the mammal.").unwrap();
        let correct = database::correct_choice_ids(&mut conn, mammal.id).await.unwrap();
        assert_eq!(correct.len(), 1);
    }
}
