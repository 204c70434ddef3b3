use std::str::FromStr;

use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqliteConnection, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::pool::Pool;

use crate::error::QuizError;
use crate::structs::models::{
    Attempt, AttemptQuestion, Category, CategorySummary, Choice, Player, Question,
};
use crate::structs::question::{ChoicePayload, QuestionDraft};
use crate::structs::quiz_type::{
    AttemptId, AttemptQuestionId, CategoryId, ChoiceId, PlayerId, QuestionId,
};

// 建表语句，外键策略：分类删除置空、题目删除级联选项、被答卷引用的题目禁止删除
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS categories (
        id    INTEGER PRIMARY KEY AUTOINCREMENT,
        name  TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS questions (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        prompt          TEXT NOT NULL,
        qtype           TEXT NOT NULL,
        category_id     INTEGER REFERENCES categories(id) ON DELETE SET NULL,
        difficulty      TEXT NOT NULL,
        text_answer     TEXT,
        numeric_answer  REAL,
        image_required  INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS choices (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        question_id  INTEGER NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
        text         TEXT NOT NULL,
        is_correct   INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS players (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        player_uuid  TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS attempts (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        player_id   INTEGER NOT NULL REFERENCES players(id) ON DELETE CASCADE,
        created_at  TEXT NOT NULL,
        score       INTEGER NOT NULL DEFAULT 0,
        total       INTEGER NOT NULL DEFAULT 5
    )",
    "CREATE TABLE IF NOT EXISTS attempt_questions (
        id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        attempt_id           INTEGER NOT NULL REFERENCES attempts(id) ON DELETE CASCADE,
        question_id          INTEGER NOT NULL REFERENCES questions(id) ON DELETE RESTRICT,
        prompt               TEXT NOT NULL,
        qtype                TEXT NOT NULL,
        text_response        TEXT,
        numeric_response     REAL,
        image                TEXT,
        image_size           INTEGER,
        selected_choice_ids  TEXT NOT NULL DEFAULT '[]',
        is_correct           INTEGER NOT NULL DEFAULT 0,
        correct_choice_ids   TEXT NOT NULL DEFAULT '[]'
    )",
    "CREATE INDEX IF NOT EXISTS idx_attempts_player ON attempts (player_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_attempt_questions_attempt ON attempt_questions (attempt_id)",
];

/// 创建连接池并建表，数据库文件不存在时自动创建
pub async fn connect(sql_file: &str, max_connections: u32) -> Result<Pool<Sqlite>, QuizError> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", sql_file))?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| {
            log::error!("创建SQL连接池失败: {:?}", e);
            e
        })?;

    let mut conn = pool.acquire().await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&mut *conn).await.map_err(|e| {
            log::error!("执行创建表命令失败: {:?}", e);
            e
        })?;
    }
    log::info!("数据库{}已就绪", sql_file);
    Ok(pool)
}

// ---------- 分类 ----------

pub async fn list_categories(conn: &mut SqliteConnection) -> Result<Vec<CategorySummary>, QuizError> {
    let rows = sqlx::query_as::<_, CategorySummary>(
        "SELECT c.id, c.name, COUNT(q.id) AS question_count
         FROM categories c LEFT JOIN questions q ON q.category_id = c.id
         GROUP BY c.id, c.name
         ORDER BY c.id",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn get_category(conn: &mut SqliteConnection, id: CategoryId) -> Result<Option<Category>, QuizError> {
    let row = sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

pub async fn insert_category(conn: &mut SqliteConnection, name: &str) -> Result<Category, QuizError> {
    let id = sqlx::query("INSERT INTO categories (name) VALUES (?)")
        .bind(name)
        .execute(&mut *conn)
        .await
        .map_err(duplicate_name)?
        .last_insert_rowid();
    Ok(Category {
        id,
        name: name.to_string(),
    })
}

pub async fn rename_category(
    conn: &mut SqliteConnection,
    id: CategoryId,
    name: &str,
) -> Result<Option<Category>, QuizError> {
    let affected = sqlx::query("UPDATE categories SET name = ? WHERE id = ?")
        .bind(name)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(duplicate_name)?
        .rows_affected();
    Ok((affected > 0).then(|| Category {
        id,
        name: name.to_string(),
    }))
}

/// 删除分类，原属该分类的题目category_id被置空
pub async fn delete_category(conn: &mut SqliteConnection, id: CategoryId) -> Result<bool, QuizError> {
    let affected = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    Ok(affected > 0)
}

pub async fn get_or_create_category(conn: &mut SqliteConnection, name: &str) -> Result<Category, QuizError> {
    sqlx::query("INSERT OR IGNORE INTO categories (name) VALUES (?)")
        .bind(name)
        .execute(&mut *conn)
        .await?;
    let row = sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE name = ?")
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
    Ok(row)
}

fn duplicate_name(e: sqlx::Error) -> QuizError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            QuizError::BadRequest("category with this name already exists.".to_string())
        }
        _ => QuizError::Database(e),
    }
}

// ---------- 题目与选项 ----------

const QUESTION_COLUMNS: &str =
    "id, prompt, qtype, category_id, difficulty, text_answer, numeric_answer, image_required";

pub async fn list_questions(conn: &mut SqliteConnection) -> Result<Vec<Question>, QuizError> {
    let rows = sqlx::query_as::<_, Question>(&format!(
        "SELECT {} FROM questions ORDER BY id",
        QUESTION_COLUMNS
    ))
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn get_question(conn: &mut SqliteConnection, id: QuestionId) -> Result<Option<Question>, QuizError> {
    let row = sqlx::query_as::<_, Question>(&format!(
        "SELECT {} FROM questions WHERE id = ?",
        QUESTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

pub async fn question_ids(conn: &mut SqliteConnection) -> Result<Vec<QuestionId>, QuizError> {
    let rows: Vec<(QuestionId,)> = sqlx::query_as("SELECT id FROM questions ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(|row| row.0).collect())
}

pub async fn insert_question(conn: &mut SqliteConnection, draft: &QuestionDraft) -> Result<QuestionId, QuizError> {
    let id = sqlx::query(
        "INSERT INTO questions
            (prompt, qtype, category_id, difficulty, text_answer, numeric_answer, image_required)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&draft.prompt)
    .bind(draft.qtype)
    .bind(draft.category_id)
    .bind(draft.difficulty)
    .bind(&draft.text_answer)
    .bind(draft.numeric_answer)
    .bind(draft.image_required)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn update_question(
    conn: &mut SqliteConnection,
    id: QuestionId,
    draft: &QuestionDraft,
) -> Result<(), QuizError> {
    sqlx::query(
        "UPDATE questions SET
            prompt = ?, qtype = ?, category_id = ?, difficulty = ?,
            text_answer = ?, numeric_answer = ?, image_required = ?
         WHERE id = ?",
    )
    .bind(&draft.prompt)
    .bind(draft.qtype)
    .bind(draft.category_id)
    .bind(draft.difficulty)
    .bind(&draft.text_answer)
    .bind(draft.numeric_answer)
    .bind(draft.image_required)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// 用新的选项整体替换题目现有选项
pub async fn replace_choices(
    conn: &mut SqliteConnection,
    question_id: QuestionId,
    choices: &[ChoicePayload],
) -> Result<(), QuizError> {
    sqlx::query("DELETE FROM choices WHERE question_id = ?")
        .bind(question_id)
        .execute(&mut *conn)
        .await?;
    for choice in choices {
        sqlx::query("INSERT INTO choices (question_id, text, is_correct) VALUES (?, ?, ?)")
            .bind(question_id)
            .bind(&choice.text)
            .bind(choice.is_correct)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn delete_question(conn: &mut SqliteConnection, id: QuestionId) -> Result<bool, QuizError> {
    let affected = sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    Ok(affected > 0)
}

/// 引用该题目的答卷题数量
pub async fn question_references(conn: &mut SqliteConnection, id: QuestionId) -> Result<i64, QuizError> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM attempt_questions WHERE question_id = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.0)
}

pub async fn list_choices(conn: &mut SqliteConnection, question_id: QuestionId) -> Result<Vec<Choice>, QuizError> {
    let rows = sqlx::query_as::<_, Choice>(
        "SELECT id, question_id, text, is_correct FROM choices WHERE question_id = ? ORDER BY id",
    )
    .bind(question_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn correct_choice_ids(
    conn: &mut SqliteConnection,
    question_id: QuestionId,
) -> Result<Vec<ChoiceId>, QuizError> {
    let rows: Vec<(ChoiceId,)> = sqlx::query_as(
        "SELECT id FROM choices WHERE question_id = ? AND is_correct = 1 ORDER BY id",
    )
    .bind(question_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(|row| row.0).collect())
}

// ---------- 玩家与答卷 ----------

pub async fn get_or_create_player(conn: &mut SqliteConnection, player_uuid: &str) -> Result<Player, QuizError> {
    sqlx::query("INSERT OR IGNORE INTO players (player_uuid) VALUES (?)")
        .bind(player_uuid)
        .execute(&mut *conn)
        .await?;
    let row = sqlx::query_as::<_, Player>("SELECT id, player_uuid FROM players WHERE player_uuid = ?")
        .bind(player_uuid)
        .fetch_one(&mut *conn)
        .await?;
    Ok(row)
}

pub async fn find_player(conn: &mut SqliteConnection, player_uuid: &str) -> Result<Option<Player>, QuizError> {
    let row = sqlx::query_as::<_, Player>("SELECT id, player_uuid FROM players WHERE player_uuid = ?")
        .bind(player_uuid)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

pub async fn get_player(conn: &mut SqliteConnection, id: PlayerId) -> Result<Option<Player>, QuizError> {
    let row = sqlx::query_as::<_, Player>("SELECT id, player_uuid FROM players WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

pub async fn insert_attempt(
    conn: &mut SqliteConnection,
    player_id: PlayerId,
    created_at: &str,
    total: i64,
) -> Result<AttemptId, QuizError> {
    let id = sqlx::query("INSERT INTO attempts (player_id, created_at, score, total) VALUES (?, ?, 0, ?)")
        .bind(player_id)
        .bind(created_at)
        .bind(total)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();
    Ok(id)
}

pub async fn get_attempt(conn: &mut SqliteConnection, id: AttemptId) -> Result<Option<Attempt>, QuizError> {
    let row = sqlx::query_as::<_, Attempt>(
        "SELECT id, player_id, created_at, score, total FROM attempts WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// 玩家的答题记录，最新的在前
pub async fn list_attempts(conn: &mut SqliteConnection, player_id: PlayerId) -> Result<Vec<Attempt>, QuizError> {
    let rows = sqlx::query_as::<_, Attempt>(
        "SELECT id, player_id, created_at, score, total FROM attempts
         WHERE player_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(player_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn set_score(conn: &mut SqliteConnection, id: AttemptId, score: i64) -> Result<(), QuizError> {
    sqlx::query("UPDATE attempts SET score = ? WHERE id = ?")
        .bind(score)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// 删除答卷，答卷题目随外键级联删除
pub async fn delete_attempt(conn: &mut SqliteConnection, id: AttemptId) -> Result<bool, QuizError> {
    let affected = sqlx::query("DELETE FROM attempts WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    Ok(affected > 0)
}

/// 删除玩家及其全部答卷
pub async fn delete_player(conn: &mut SqliteConnection, player_uuid: &str) -> Result<bool, QuizError> {
    let affected = sqlx::query("DELETE FROM players WHERE player_uuid = ?")
        .bind(player_uuid)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    Ok(affected > 0)
}

/// 为答卷冻结一道题，同时记录当时的正确选项
pub async fn insert_attempt_question(
    conn: &mut SqliteConnection,
    attempt_id: AttemptId,
    question: &Question,
    correct_choice_ids: &[ChoiceId],
) -> Result<AttemptQuestionId, QuizError> {
    let id = sqlx::query(
        "INSERT INTO attempt_questions (attempt_id, question_id, prompt, qtype, correct_choice_ids)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(attempt_id)
    .bind(question.id)
    .bind(&question.prompt)
    .bind(question.qtype)
    .bind(Json(correct_choice_ids))
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn attempt_questions(
    conn: &mut SqliteConnection,
    attempt_id: AttemptId,
) -> Result<Vec<AttemptQuestion>, QuizError> {
    let rows = sqlx::query_as::<_, AttemptQuestion>(
        "SELECT id, attempt_id, question_id, prompt, qtype, text_response, numeric_response,
                image, image_size, selected_choice_ids, is_correct, correct_choice_ids
         FROM attempt_questions WHERE attempt_id = ? ORDER BY id",
    )
    .bind(attempt_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// 写入玩家作答
pub async fn save_response(conn: &mut SqliteConnection, aq: &AttemptQuestion) -> Result<(), QuizError> {
    sqlx::query(
        "UPDATE attempt_questions SET
            text_response = ?, numeric_response = ?, selected_choice_ids = ?,
            image = ?, image_size = ?
         WHERE id = ?",
    )
    .bind(&aq.text_response)
    .bind(aq.numeric_response)
    .bind(Json(&aq.selected_choice_ids.0))
    .bind(&aq.image)
    .bind(aq.image_size)
    .bind(aq.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// 写入判分结果
pub async fn save_verdict(
    conn: &mut SqliteConnection,
    id: AttemptQuestionId,
    is_correct: bool,
    correct_choice_ids: &[ChoiceId],
) -> Result<(), QuizError> {
    sqlx::query("UPDATE attempt_questions SET is_correct = ?, correct_choice_ids = ? WHERE id = ?")
        .bind(is_correct)
        .bind(Json(correct_choice_ids))
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn count_correct(conn: &mut SqliteConnection, attempt_id: AttemptId) -> Result<i64, QuizError> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM attempt_questions WHERE attempt_id = ? AND is_correct = 1")
            .bind(attempt_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(row.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::models::{Difficulty, QuestionType};
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn test_pool() -> Pool<Sqlite> {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!("quiz_db_test_{}_{}.db", std::process::id(), id));
        let _ = std::fs::remove_file(&path);
        connect(&path.display().to_string(), 1).await.unwrap()
    }

    fn draft(prompt: &str, qtype: QuestionType, category_id: Option<CategoryId>) -> QuestionDraft {
        QuestionDraft {
            prompt: prompt.to_string(),
            qtype,
            category_id,
            difficulty: Difficulty::Medium,
            text_answer: Some("answer".to_string()),
            numeric_answer: None,
            image_required: false,
            choices: None,
        }
    }

    #[tokio::test]
    async fn question_round_trip_with_choices() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let id = insert_question(&mut conn, &draft("Pick", QuestionType::Single, None))
            .await
            .unwrap();
        let choices = vec![
            ChoicePayload { id: None, text: "Green".to_string(), is_correct: false },
            ChoicePayload { id: Some(99), text: "Blue".to_string(), is_correct: true },
        ];
        replace_choices(&mut conn, id, &choices).await.unwrap();

        let question = get_question(&mut conn, id).await.unwrap().unwrap();
        assert_eq!(question.qtype, QuestionType::Single);
        assert_eq!(question.difficulty, Difficulty::Medium);

        let stored = list_choices(&mut conn, id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_ne!(stored[1].id, 99);
        assert_eq!(correct_choice_ids(&mut conn, id).await.unwrap(), vec![stored[1].id]);

        assert!(delete_question(&mut conn, id).await.unwrap());
        assert!(list_choices(&mut conn, id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_category_nulls_questions() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let category = insert_category(&mut conn, "Geography").await.unwrap();
        let id = insert_question(&mut conn, &draft("Capital?", QuestionType::Text, Some(category.id)))
            .await
            .unwrap();
        let summary = list_categories(&mut conn).await.unwrap();
        assert_eq!(summary[0].question_count, 1);

        assert!(delete_category(&mut conn, category.id).await.unwrap());
        let question = get_question(&mut conn, id).await.unwrap().unwrap();
        assert_eq!(question.category_id, None);
    }

    #[tokio::test]
    async fn duplicate_category_is_a_client_error() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        insert_category(&mut conn, "General").await.unwrap();
        let err = insert_category(&mut conn, "General").await.unwrap_err();
        assert!(matches!(err, QuizError::BadRequest(_)));
        let same = get_or_create_category(&mut conn, "General").await.unwrap();
        assert_eq!(same.name, "General");
    }

    #[tokio::test]
    async fn referenced_question_cannot_be_deleted() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let id = insert_question(&mut conn, &draft("Capital?", QuestionType::Text, None))
            .await
            .unwrap();
        let question = get_question(&mut conn, id).await.unwrap().unwrap();
        let player = get_or_create_player(&mut conn, "6f1c1f6e-3a55-4c9e-9d51-2d0f0c1d8a10")
            .await
            .unwrap();
        let attempt = insert_attempt(&mut conn, player.id, "2026-01-01T00:00:00.000000Z", 1)
            .await
            .unwrap();
        insert_attempt_question(&mut conn, attempt, &question, &[]).await.unwrap();

        assert_eq!(question_references(&mut conn, id).await.unwrap(), 1);
        // 外键约束同样拒绝删除
        assert!(delete_question(&mut conn, id).await.is_err());
    }

    #[tokio::test]
    async fn deleting_player_cascades_to_attempts() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let id = insert_question(&mut conn, &draft("Capital?", QuestionType::Text, None))
            .await
            .unwrap();
        let question = get_question(&mut conn, id).await.unwrap().unwrap();
        let uuid = "9a7b3c52-1d4e-4f6a-8b2c-3e5d7f9a1b0c";
        let player = get_or_create_player(&mut conn, uuid).await.unwrap();
        let first = insert_attempt(&mut conn, player.id, "2026-01-01T00:00:00.000000Z", 1)
            .await
            .unwrap();
        let second = insert_attempt(&mut conn, player.id, "2026-01-02T00:00:00.000000Z", 1)
            .await
            .unwrap();
        insert_attempt_question(&mut conn, first, &question, &[]).await.unwrap();
        insert_attempt_question(&mut conn, second, &question, &[]).await.unwrap();

        // 单独删除一份答卷只带走它自己的题目
        assert!(delete_attempt(&mut conn, first).await.unwrap());
        assert!(attempt_questions(&mut conn, first).await.unwrap().is_empty());
        assert_eq!(question_references(&mut conn, id).await.unwrap(), 1);

        assert!(delete_player(&mut conn, uuid).await.unwrap());
        assert!(find_player(&mut conn, uuid).await.unwrap().is_none());
        assert!(get_attempt(&mut conn, second).await.unwrap().is_none());
        assert!(attempt_questions(&mut conn, second).await.unwrap().is_empty());
        assert_eq!(question_references(&mut conn, id).await.unwrap(), 0);

        // 不再被引用的题目可以删除
        assert!(delete_question(&mut conn, id).await.unwrap());
        assert!(!delete_player(&mut conn, uuid).await.unwrap());
        assert!(!delete_attempt(&mut conn, second).await.unwrap());
    }

    #[tokio::test]
    async fn players_are_created_once() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let uuid = "0e8d4a8c-8a43-4a6e-b3f6-0a3c2b6b7f21";
        let first = get_or_create_player(&mut conn, uuid).await.unwrap();
        let second = get_or_create_player(&mut conn, uuid).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(find_player(&mut conn, "missing").await.unwrap().is_none());
    }
}
