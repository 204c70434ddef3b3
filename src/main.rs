use std::error::Error;

use actix_web::{middleware, web, App, HttpServer};

use quiz_server::config::Config;
use quiz_server::sql_server::SqlServer;
use quiz_server::{database, seed};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::var("QUIZ_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::load(&config_path)?;

    let pool = database::connect(&config.database_file, config.max_connections).await?;
    if config.seed_demo_questions {
        seed::seed_if_empty(&pool).await?;
    }
    std::fs::create_dir_all(config.answers_dir())?;

    // 启动sql_server，所有数据库操作都经由它的handle
    let (sql_server, sql_server_handle) = SqlServer::new(pool, config.sampler(), config.play_settings());
    tokio::spawn(sql_server.run());

    let bind_address = config.bind_address.clone();
    let config = web::Data::new(config);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .app_data(web::Data::new(sql_server_handle.clone()))
            .app_data(config.clone())
            .configure(quiz_server::routes)
            .service(quiz_server::media_files(&config))
    })
    .bind(&bind_address)?
    .run();
    log::info!("HTTP服务启动成功，监听{}", bind_address);
    server.await?;
    Ok(())
}
