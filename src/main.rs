pub mod auth;
pub mod config;
pub mod contacts;
pub mod db;
pub mod err;
pub mod mail;
pub mod models;
pub mod students;
pub mod uploads;
pub mod validate;
pub mod verification;

use std::sync::Arc;

use axum::handler::Handler;
use axum::routing::{get, post};
use axum::{middleware, Extension, Router};
use tower::ServiceBuilder;

use crate::config::Config;
use crate::mail::Mailer;
use crate::uploads::UploadStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Arc::new(Config::from_env()?);
    let pool = db::connect(&config.database_url).await?;
    db::init_schema(&pool).await?;
    if let Some(seed) = &config.seed_admin {
        db::provision_admin(&pool, seed).await?;
    }

    let store = UploadStore::new(config.uploads_dir.clone());
    store.prepare().await?;
    let mailer = Arc::new(Mailer::new(config.mail.clone()));

    // Everything added before the route_layer call sits behind the
    // credential check; login and logout are added after it.
    let admin_api = Router::new()
        .route("/me", get(auth::me))
        .route(
            "/students",
            get(students::list).post(students::create),
        )
        .route(
            "/students/:id",
            get(students::get_one)
                .patch(students::update)
                .delete(students::remove),
        )
        .route("/contacts", get(contacts::list))
        .route(
            "/contacts/:id",
            get(contacts::get_one).patch(contacts::update),
        )
        .route_layer(middleware::from_fn(auth::require_admin))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout));

    let app = Router::new()
        .route("/apply", post(students::submit_application))
        .route("/contact", post(contacts::submit))
        .route(
            "/verification",
            get(verification::lookup_query).post(verification::lookup),
        )
        .route("/uploads/*path", get(uploads::serve_upload))
        .nest("/admin", admin_api)
        .fallback(err::handler404.into_service())
        .layer(
            ServiceBuilder::new()
                .layer(Extension(pool))
                .layer(Extension(config.clone()))
                .layer(Extension(store))
                .layer(Extension(mailer)),
        );

    log::info!(
        "starting admissions server on http://{}",
        config.bind_addr
    );
    axum::Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
