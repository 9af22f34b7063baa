use actix_cors::Cors;
use actix_web::{middleware as actix_middleware, web, App, HttpServer};
use dotenvy::dotenv;
use std::sync::Arc;

use outreachiq::config::Config;
use outreachiq::{api, db, middleware};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Arc::new(Config::from_env());
    let pool = db::connect_and_migrate(&config.database_url)
        .await
        .expect("failed to connect to database / run migrations");

    tracing::info!("outreachiq API starting on http://0.0.0.0:8080");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&config.frontend_url)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "PATCH"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(config.clone()))
            .wrap(cors)
            .wrap(actix_middleware::Logger::default())
            .wrap(middleware::auth::AuthMiddleware)
            .service(
                web::scope("/api")
                    .configure(api::auth::configure)
                    .configure(api::leads::configure)
                    .configure(api::campaigns::configure)
                    .configure(api::analytics::configure)
                    .configure(api::inboxes::configure)
                    .configure(api::compliance::configure),
            )
            .route("/health", web::get().to(|| async { "OK" }))
    })
    .bind(("0.0.0.0", 8080))?
    .run()
    .await
}
