use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use sqlx::sqlite::{Sqlite, SqliteConnection};
use sqlx::pool::Pool;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};

use crate::answers::AnswerMap;
use crate::config::PlaySettings;
use crate::database;
use crate::error::QuizError;
use crate::grading::{self, AnswerKey, Response};
use crate::structs::models::{Attempt, Category, CategorySummary, Choice, QuestionView};
use crate::structs::question::{CategoryPayload, QuestionDraft, QuestionPayload};
use crate::structs::quiz_type::{AttemptId, CategoryId, QuestionId};
use crate::structs::submit::{AttemptQuestionView, AttemptView};

type Reply<T> = oneshot::Sender<Result<T, QuizError>>;

/// 已写入media_root的答题图片
#[derive(Debug, Clone)]
pub struct StoredImage {
    /// 相对于media_root的路径
    pub path: String,
    pub size: i64,
}

#[derive(Debug)]
enum Command {
    ListCategories {
        res_tx: Reply<Vec<CategorySummary>>,
    },
    GetCategory {
        id: CategoryId,
        res_tx: Reply<Category>,
    },
    CreateCategory {
        payload: CategoryPayload,
        res_tx: Reply<Category>,
    },
    RenameCategory {
        id: CategoryId,
        payload: CategoryPayload,
        res_tx: Reply<Category>,
    },
    DeleteCategory {
        id: CategoryId,
        res_tx: Reply<()>,
    },
    ListQuestions {
        res_tx: Reply<Vec<QuestionView>>,
    },
    GetQuestion {
        id: QuestionId,
        res_tx: Reply<QuestionView>,
    },
    CreateQuestion {
        payload: QuestionPayload,
        res_tx: Reply<QuestionView>,
    },
    UpdateQuestion {
        id: QuestionId,
        payload: QuestionPayload,
        partial: bool,
        res_tx: Reply<QuestionView>,
    },
    DeleteQuestion {
        id: QuestionId,
        res_tx: Reply<()>,
    },
    ListChoices {
        id: QuestionId,
        res_tx: Reply<Vec<Choice>>,
    },
    StartAttempt {
        player_uuid: String,
        res_tx: Reply<AttemptView>,
    },
    SubmitAttempt {
        id: AttemptId,
        answers: AnswerMap,
        image: Option<StoredImage>,
        res_tx: Reply<AttemptView>,
    },
    GetAttempt {
        id: AttemptId,
        res_tx: Reply<AttemptView>,
    },
    ListAttempts {
        player_uuid: String,
        res_tx: Reply<Vec<AttemptView>>,
    },
    DeleteAttempt {
        id: AttemptId,
        res_tx: Reply<()>,
    },
    DeletePlayer {
        player_uuid: String,
        res_tx: Reply<()>,
    },
}

pub struct SqlServer {
    // sql连接池
    pool: Pool<Sqlite>,

    /// 接收命令的管道
    cmd_rx: mpsc::UnboundedReceiver<Command>,

    /// 抽题用的随机数发生器，测试时可固定种子
    rng: StdRng,

    settings: PlaySettings,
}

/// 命令执行层
impl SqlServer {
    pub fn new(pool: Pool<Sqlite>, rng: StdRng, settings: PlaySettings) -> (SqlServer, SqlServerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        (
            SqlServer {
                pool,
                cmd_rx,
                rng,
                settings,
            },
            SqlServerHandle { cmd_tx },
        )
    }

    async fn get_category(&self, id: CategoryId) -> Result<Category, QuizError> {
        let mut conn = self.pool.acquire().await?;
        database::get_category(&mut conn, id)
            .await?
            .ok_or(QuizError::NotFound("category"))
    }

    async fn create_category(&self, payload: CategoryPayload) -> Result<Category, QuizError> {
        let name = category_name(payload)?;
        let mut conn = self.pool.acquire().await?;
        database::insert_category(&mut conn, &name).await
    }

    async fn rename_category(&self, id: CategoryId, payload: CategoryPayload) -> Result<Category, QuizError> {
        let name = category_name(payload)?;
        let mut conn = self.pool.acquire().await?;
        database::rename_category(&mut conn, id, &name)
            .await?
            .ok_or(QuizError::NotFound("category"))
    }

    async fn delete_category(&self, id: CategoryId) -> Result<(), QuizError> {
        let mut conn = self.pool.acquire().await?;
        if database::delete_category(&mut conn, id).await? {
            log::info!("删除分类{}", id);
            Ok(())
        } else {
            Err(QuizError::NotFound("category"))
        }
    }

    async fn list_questions(&self) -> Result<Vec<QuestionView>, QuizError> {
        let mut conn = self.pool.acquire().await?;
        let questions = database::list_questions(&mut conn).await?;
        let mut views = Vec::with_capacity(questions.len());
        for question in questions {
            let choices = database::list_choices(&mut conn, question.id).await?;
            views.push(QuestionView::new(question, choices));
        }
        Ok(views)
    }

    async fn get_question(&self, id: QuestionId) -> Result<QuestionView, QuizError> {
        let mut conn = self.pool.acquire().await?;
        question_view(&mut conn, id).await
    }

    async fn create_question(&self, payload: QuestionPayload) -> Result<QuestionView, QuizError> {
        let draft = payload.into_draft()?;
        draft.validate(&[])?;

        let mut tx = self.pool.begin().await?;
        check_category(&mut tx, &draft).await?;
        let id = database::insert_question(&mut tx, &draft).await?;
        if let Some(choices) = &draft.choices {
            database::replace_choices(&mut tx, id, choices).await?;
        }
        let view = question_view(&mut tx, id).await?;
        tx.commit().await?;
        log::info!("新建题目{}", id);
        Ok(view)
    }

    /// partial为true时对应PATCH，否则为整体替换
    async fn update_question(
        &self,
        id: QuestionId,
        payload: QuestionPayload,
        partial: bool,
    ) -> Result<QuestionView, QuizError> {
        let mut tx = self.pool.begin().await?;
        let current = database::get_question(&mut tx, id)
            .await?
            .ok_or(QuizError::NotFound("question"))?;
        let draft = if partial {
            payload.merge_into(&current)
        } else {
            payload.into_draft()?
        };
        let existing = database::list_choices(&mut tx, id).await?;
        draft.validate(&existing)?;
        check_category(&mut tx, &draft).await?;

        database::update_question(&mut tx, id, &draft).await?;
        if let Some(choices) = &draft.choices {
            database::replace_choices(&mut tx, id, choices).await?;
        }
        let view = question_view(&mut tx, id).await?;
        tx.commit().await?;
        Ok(view)
    }

    async fn delete_question(&self, id: QuestionId) -> Result<(), QuizError> {
        let mut tx = self.pool.begin().await?;
        if database::get_question(&mut tx, id).await?.is_none() {
            return Err(QuizError::NotFound("question"));
        }
        let references = database::question_references(&mut tx, id).await?;
        if references > 0 {
            return Err(QuizError::Protected(format!(
                "question {} is referenced by {} attempt question(s) and cannot be deleted.",
                id, references
            )));
        }
        database::delete_question(&mut tx, id).await?;
        tx.commit().await?;
        log::info!("删除题目{}", id);
        Ok(())
    }

    async fn list_choices(&self, id: QuestionId) -> Result<Vec<Choice>, QuizError> {
        let mut conn = self.pool.acquire().await?;
        if database::get_question(&mut conn, id).await?.is_none() {
            return Err(QuizError::NotFound("question"));
        }
        database::list_choices(&mut conn, id).await
    }

    /// 为玩家随机抽题并生成答卷，题库不足时不写入任何答卷
    async fn start_attempt(&mut self, player_uuid: String) -> Result<AttemptView, QuizError> {
        let count = self.settings.questions_per_attempt;
        let mut tx = self.pool.begin().await?;

        let player = database::get_or_create_player(&mut tx, &player_uuid).await?;
        let ids = database::question_ids(&mut tx).await?;
        if ids.len() < count {
            // 丢弃事务，新建的玩家也一并回滚
            return Err(QuizError::BadRequest("Not enough questions in bank".to_string()));
        }
        let selected: Vec<QuestionId> = ids.choose_multiple(&mut self.rng, count).copied().collect();

        let created_at = now_timestamp()?;
        let attempt_id = database::insert_attempt(&mut tx, player.id, &created_at, count as i64).await?;
        for question_id in selected {
            let question = database::get_question(&mut tx, question_id)
                .await?
                .ok_or(QuizError::NotFound("question"))?;
            let correct = database::correct_choice_ids(&mut tx, question_id).await?;
            database::insert_attempt_question(&mut tx, attempt_id, &question, &correct).await?;
        }
        let view = self.attempt_view(&mut tx, attempt_id).await?;
        tx.commit().await?;
        log::info!("玩家{}开始答卷{}", player_uuid, attempt_id);
        Ok(view)
    }

    /// 写入作答、逐题判分并重新统计总分；重复提交会覆盖上一次的结果
    async fn submit_attempt(
        &self,
        id: AttemptId,
        answers: AnswerMap,
        image: Option<StoredImage>,
    ) -> Result<AttemptView, QuizError> {
        let mut conn = self.pool.acquire().await?;
        if database::get_attempt(&mut conn, id).await?.is_none() {
            return Err(QuizError::NotFound("attempt"));
        }

        for mut aq in database::attempt_questions(&mut conn, id).await? {
            let record = answers.get(&aq.id.to_string()).cloned().unwrap_or_default();
            aq.text_response = record.text_response;
            aq.numeric_response = record.numeric_response;
            aq.selected_choice_ids.0 = record.selected_choice_ids;
            // 没有上传图片时同样清空上一次的图片
            aq.image = image.as_ref().map(|image| image.path.clone());
            aq.image_size = image.as_ref().map(|image| image.size);
            database::save_response(&mut conn, &aq).await?;

            let question = database::get_question(&mut conn, aq.question_id)
                .await?
                .ok_or(QuizError::NotFound("question"))?;
            let correct = if aq.qtype.is_choice() {
                database::correct_choice_ids(&mut conn, aq.question_id).await?
            } else {
                Vec::new()
            };
            let verdict = grading::grade(
                aq.qtype,
                &Response::from(&aq),
                &AnswerKey::new(&question, &correct),
            );
            let snapshot = verdict.correct_choice_ids.unwrap_or(aq.correct_choice_ids.0);
            database::save_verdict(&mut conn, aq.id, verdict.is_correct, &snapshot).await?;
        }

        let score = database::count_correct(&mut conn, id).await?;
        database::set_score(&mut conn, id, score).await?;
        log::info!("答卷{}提交完成，得分{}", id, score);
        self.attempt_view(&mut conn, id).await
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<AttemptView, QuizError> {
        let mut conn = self.pool.acquire().await?;
        self.attempt_view(&mut conn, id).await
    }

    async fn delete_attempt(&self, id: AttemptId) -> Result<(), QuizError> {
        let mut conn = self.pool.acquire().await?;
        if database::delete_attempt(&mut conn, id).await? {
            log::info!("删除答卷{}", id);
            Ok(())
        } else {
            Err(QuizError::NotFound("attempt"))
        }
    }

    /// 删除玩家，其答卷和答卷题目一并删除
    async fn delete_player(&self, player_uuid: String) -> Result<(), QuizError> {
        let mut conn = self.pool.acquire().await?;
        if database::delete_player(&mut conn, &player_uuid).await? {
            log::info!("删除玩家{}", player_uuid);
            Ok(())
        } else {
            Err(QuizError::NotFound("player"))
        }
    }

    async fn list_attempts(&self, player_uuid: String) -> Result<Vec<AttemptView>, QuizError> {
        let mut conn = self.pool.acquire().await?;
        let Some(player) = database::find_player(&mut conn, &player_uuid).await? else {
            return Ok(Vec::new());
        };
        let attempts = database::list_attempts(&mut conn, player.id).await?;
        let mut views = Vec::with_capacity(attempts.len());
        for attempt in attempts {
            views.push(self.assemble_view(&mut conn, attempt, player.player_uuid.clone()).await?);
        }
        Ok(views)
    }

    async fn attempt_view(&self, conn: &mut SqliteConnection, id: AttemptId) -> Result<AttemptView, QuizError> {
        let attempt = database::get_attempt(conn, id)
            .await?
            .ok_or(QuizError::NotFound("attempt"))?;
        let player = database::get_player(conn, attempt.player_id)
            .await?
            .ok_or(QuizError::NotFound("player"))?;
        self.assemble_view(conn, attempt, player.player_uuid).await
    }

    async fn assemble_view(
        &self,
        conn: &mut SqliteConnection,
        attempt: Attempt,
        player_uuid: String,
    ) -> Result<AttemptView, QuizError> {
        let mut attempt_questions = Vec::new();
        for aq in database::attempt_questions(conn, attempt.id).await? {
            let choices = database::list_choices(conn, aq.question_id).await?;
            attempt_questions.push(AttemptQuestionView {
                id: aq.id,
                question_id: aq.question_id,
                prompt: aq.prompt,
                qtype: aq.qtype,
                selected_choice_ids: aq.selected_choice_ids.0,
                text_response: aq.text_response,
                numeric_response: aq.numeric_response,
                image: aq
                    .image
                    .filter(|path| !path.is_empty())
                    .map(|path| format!("{}{}", self.settings.media_url, path)),
                is_correct: aq.is_correct,
                correct_choice_ids: aq.correct_choice_ids.0,
                choices,
            });
        }
        Ok(AttemptView {
            id: attempt.id,
            player_uuid,
            created_at: attempt.created_at,
            score: attempt.score,
            total: attempt.total,
            attempt_questions,
        })
    }

    pub async fn run(mut self) {
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Command::ListCategories { res_tx } => {
                    let result = match self.pool.acquire().await {
                        Ok(mut conn) => database::list_categories(&mut conn).await,
                        Err(e) => Err(e.into()),
                    };
                    let _ = res_tx.send(result);
                }
                Command::GetCategory { id, res_tx } => {
                    let _ = res_tx.send(self.get_category(id).await);
                }
                Command::CreateCategory { payload, res_tx } => {
                    let _ = res_tx.send(self.create_category(payload).await);
                }
                Command::RenameCategory { id, payload, res_tx } => {
                    let _ = res_tx.send(self.rename_category(id, payload).await);
                }
                Command::DeleteCategory { id, res_tx } => {
                    let _ = res_tx.send(self.delete_category(id).await);
                }
                Command::ListQuestions { res_tx } => {
                    let _ = res_tx.send(self.list_questions().await);
                }
                Command::GetQuestion { id, res_tx } => {
                    let _ = res_tx.send(self.get_question(id).await);
                }
                Command::CreateQuestion { payload, res_tx } => {
                    let _ = res_tx.send(self.create_question(payload).await);
                }
                Command::UpdateQuestion { id, payload, partial, res_tx } => {
                    let _ = res_tx.send(self.update_question(id, payload, partial).await);
                }
                Command::DeleteQuestion { id, res_tx } => {
                    let _ = res_tx.send(self.delete_question(id).await);
                }
                Command::ListChoices { id, res_tx } => {
                    let _ = res_tx.send(self.list_choices(id).await);
                }
                Command::StartAttempt { player_uuid, res_tx } => {
                    let _ = res_tx.send(self.start_attempt(player_uuid).await);
                }
                Command::SubmitAttempt { id, answers, image, res_tx } => {
                    let _ = res_tx.send(self.submit_attempt(id, answers, image).await);
                }
                Command::GetAttempt { id, res_tx } => {
                    let _ = res_tx.send(self.get_attempt(id).await);
                }
                Command::ListAttempts { player_uuid, res_tx } => {
                    let _ = res_tx.send(self.list_attempts(player_uuid).await);
                }
                Command::DeleteAttempt { id, res_tx } => {
                    let _ = res_tx.send(self.delete_attempt(id).await);
                }
                Command::DeletePlayer { player_uuid, res_tx } => {
                    let _ = res_tx.send(self.delete_player(player_uuid).await);
                }
            }
        }
        log::info!("所有handle均已释放，sql_server退出");
    }
}

fn category_name(payload: CategoryPayload) -> Result<String, QuizError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(QuizError::BadRequest("'name' must not be empty.".to_string()));
    }
    Ok(name)
}

async fn check_category(conn: &mut SqliteConnection, draft: &QuestionDraft) -> Result<(), QuizError> {
    if let Some(category_id) = draft.category_id {
        if database::get_category(conn, category_id).await?.is_none() {
            return Err(QuizError::BadRequest(format!(
                "Invalid category {} - object does not exist.",
                category_id
            )));
        }
    }
    Ok(())
}

async fn question_view(conn: &mut SqliteConnection, id: QuestionId) -> Result<QuestionView, QuizError> {
    let question = database::get_question(conn, id)
        .await?
        .ok_or(QuizError::NotFound("question"))?;
    let choices = database::list_choices(conn, id).await?;
    Ok(QuestionView::new(question, choices))
}

/// 固定宽度的UTC时间，字典序即时间顺序
fn now_timestamp() -> Result<String, QuizError> {
    OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
        ))
        .map_err(|e| QuizError::Internal(e.to_string()))
}

/// handler层
#[derive(Debug, Clone)]
pub struct SqlServerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl SqlServerHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, QuizError> {
        let (res_tx, res_rx) = oneshot::channel();
        self.cmd_tx
            .send(make(res_tx))
            .map_err(|_| QuizError::ServerClosed)?;
        res_rx.await.map_err(|_| QuizError::ServerClosed)?
    }

    pub async fn list_categories(&self) -> Result<Vec<CategorySummary>, QuizError> {
        self.request(|res_tx| Command::ListCategories { res_tx }).await
    }

    pub async fn get_category(&self, id: CategoryId) -> Result<Category, QuizError> {
        self.request(|res_tx| Command::GetCategory { id, res_tx }).await
    }

    pub async fn create_category(&self, payload: CategoryPayload) -> Result<Category, QuizError> {
        self.request(|res_tx| Command::CreateCategory { payload, res_tx }).await
    }

    pub async fn rename_category(&self, id: CategoryId, payload: CategoryPayload) -> Result<Category, QuizError> {
        self.request(|res_tx| Command::RenameCategory { id, payload, res_tx }).await
    }

    pub async fn delete_category(&self, id: CategoryId) -> Result<(), QuizError> {
        self.request(|res_tx| Command::DeleteCategory { id, res_tx }).await
    }

    pub async fn list_questions(&self) -> Result<Vec<QuestionView>, QuizError> {
        self.request(|res_tx| Command::ListQuestions { res_tx }).await
    }

    pub async fn get_question(&self, id: QuestionId) -> Result<QuestionView, QuizError> {
        self.request(|res_tx| Command::GetQuestion { id, res_tx }).await
    }

    pub async fn create_question(&self, payload: QuestionPayload) -> Result<QuestionView, QuizError> {
        self.request(|res_tx| Command::CreateQuestion { payload, res_tx }).await
    }

    pub async fn update_question(
        &self,
        id: QuestionId,
        payload: QuestionPayload,
        partial: bool,
    ) -> Result<QuestionView, QuizError> {
        self.request(|res_tx| Command::UpdateQuestion { id, payload, partial, res_tx })
            .await
    }

    pub async fn delete_question(&self, id: QuestionId) -> Result<(), QuizError> {
        self.request(|res_tx| Command::DeleteQuestion { id, res_tx }).await
    }

    pub async fn list_choices(&self, id: QuestionId) -> Result<Vec<Choice>, QuizError> {
        self.request(|res_tx| Command::ListChoices { id, res_tx }).await
    }

    /// 开始一次答题
    pub async fn start_attempt(&self, player_uuid: String) -> Result<AttemptView, QuizError> {
        self.request(|res_tx| Command::StartAttempt { player_uuid, res_tx }).await
    }

    /// 提交答案并判分
    pub async fn submit_attempt(
        &self,
        id: AttemptId,
        answers: AnswerMap,
        image: Option<StoredImage>,
    ) -> Result<AttemptView, QuizError> {
        self.request(|res_tx| Command::SubmitAttempt { id, answers, image, res_tx })
            .await
    }

    pub async fn get_attempt(&self, id: AttemptId) -> Result<AttemptView, QuizError> {
        self.request(|res_tx| Command::GetAttempt { id, res_tx }).await
    }

    pub async fn list_attempts(&self, player_uuid: String) -> Result<Vec<AttemptView>, QuizError> {
        self.request(|res_tx| Command::ListAttempts { player_uuid, res_tx }).await
    }

    pub async fn delete_attempt(&self, id: AttemptId) -> Result<(), QuizError> {
        self.request(|res_tx| Command::DeleteAttempt { id, res_tx }).await
    }

    pub async fn delete_player(&self, player_uuid: String) -> Result<(), QuizError> {
        self.request(|res_tx| Command::DeletePlayer { player_uuid, res_tx }).await
    }
}
