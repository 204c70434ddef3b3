use std::sync::atomic::{AtomicU32, Ordering};

use quiz_server::config::Config;
use quiz_server::database;
use quiz_server::sql_server::{SqlServer, SqlServerHandle};

/// 每个测试使用独立的临时目录和数据库，并启动自己的sql_server
pub async fn setup() -> (SqlServerHandle, Config) {
    setup_with(|_| {}).await
}

/// 在默认测试配置的基础上调整部分配置项
pub async fn setup_with(configure: impl FnOnce(&mut Config)) -> (SqlServerHandle, Config) {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("quiz_api_test_{}_{}", std::process::id(), id));
    // 清理上次运行残留的文件
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("failed to create test directory");

    let mut config = Config {
        database_file: dir.join("quiz.db").display().to_string(),
        media_root: dir.join("media"),
        sample_seed: Some(42),
        ..Config::default()
    };
    configure(&mut config);
    let pool = database::connect(&config.database_file, config.max_connections)
        .await
        .expect("failed to create test database");
    let (server, handle) = SqlServer::new(pool, config.sampler(), config.play_settings());
    tokio::spawn(server.run());
    (handle, config)
}
