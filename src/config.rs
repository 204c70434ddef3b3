use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;

use crate::error::QuizError;
use crate::structs::quiz_type::SqlFile;

/// 服务配置，对应config.toml，所有字段均可省略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    pub database_file: SqlFile,
    pub max_connections: u32,
    /// 上传图片的存放目录
    pub media_root: PathBuf,
    /// media_root对外暴露的url前缀
    pub media_url: String,
    pub questions_per_attempt: usize,
    /// 固定抽题随机数种子，留空则使用系统熵
    pub sample_seed: Option<u64>,
    /// 提交答卷时请求体的字节上限
    pub max_body_bytes: usize,
    /// 题库为空时写入示例题目
    pub seed_demo_questions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_address: "127.0.0.1:8081".to_string(),
            database_file: "quiz.db".to_string(),
            max_connections: 5,
            media_root: PathBuf::from("media"),
            media_url: "/media/".to_string(),
            questions_per_attempt: 5,
            sample_seed: None,
            max_body_bytes: 10 * 1024 * 1024,
            seed_demo_questions: false,
        }
    }
}

/// sql_server抽题和组装答卷时需要的配置
#[derive(Debug, Clone)]
pub struct PlaySettings {
    pub questions_per_attempt: usize,
    pub media_url: String,
}

impl Config {
    /// 读取配置文件，文件不存在时使用默认配置
    pub fn load(path: impl AsRef<Path>) -> Result<Config, QuizError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => Config::parse(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("配置文件{}不存在，使用默认配置", path.display());
                Ok(Config::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn parse(text: &str) -> Result<Config, QuizError> {
        Ok(toml::from_str(text)?)
    }

    pub fn sampler(&self) -> StdRng {
        match self.sample_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    pub fn play_settings(&self) -> PlaySettings {
        PlaySettings {
            questions_per_attempt: self.questions_per_attempt,
            media_url: self.media_url.clone(),
        }
    }

    /// 答题图片写入的目录
    pub fn answers_dir(&self) -> PathBuf {
        self.media_root.join("answers")
    }

    /// actix-files挂载路径，不带末尾斜杠
    pub fn media_mount(&self) -> &str {
        let mount = self.media_url.trim_end_matches('/');
        if mount.is_empty() {
            "/media"
        } else {
            mount
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:8081");
        assert_eq!(config.questions_per_attempt, 5);
        assert_eq!(config.media_mount(), "/media");
        assert!(config.sample_seed.is_none());
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let config = Config::parse(
            r#"
            database_file = "/tmp/other.db"
            sample_seed = 7
            media_url = "/uploads/"
            max_body_bytes = 4096
            "#,
        )
        .unwrap();
        assert_eq!(config.database_file, "/tmp/other.db");
        assert_eq!(config.sample_seed, Some(7));
        assert_eq!(config.media_mount(), "/uploads");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.max_body_bytes, 4096);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let err = Config::parse("questions_per_attempt = \"five\"").unwrap_err();
        assert!(matches!(err, QuizError::Config(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load("/nonexistent/quiz-config.toml").unwrap();
        assert_eq!(config.database_file, "quiz.db");
    }
}
