/*!
Here we go!
*/
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Extension},
    Router,
    routing::{get, get_service, post, put},
};
use simplelog::{ColorChoice, TerminalMode, TermLogger};
use tower_http::services::fs::ServeDir;

use lanyard::config;
use lanyard::inter;

// Room for a photo plus the form around it; individual uploads are
// held to media::MAX_UPLOAD_BYTES separately.
const MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("lanyard")
        .build();
    TermLogger::init(
        lanyard::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).unwrap();
    log::info!("Logging started.");

    let config_path = std::env::args().nth(1)
        .unwrap_or_else(|| "lanyard.toml".to_owned());
    let glob = config::load_configuration(&config_path).await.unwrap();
    let addr = glob.addr;
    let media_root = glob.media.root().to_owned();
    let glob = Arc::new(glob);

    let app = Router::new()
        .route(
            "/students",
            get(inter::students::index).post(inter::students::create)
        )
        .route(
            "/students/information",
            get(inter::students::information)
        )
        .route(
            "/students/batch-upload",
            post(inter::students::batch_upload)
        )
        .route(
            "/students/sample-csv",
            get(inter::students::sample_csv)
        )
        .route(
            "/students/:id",
            put(inter::students::update).delete(inter::students::destroy)
        )
        .route("/cards/:id/download", post(inter::cards::download))
        .route("/cards/:id/print", post(inter::cards::print))
        .nest_service("/storage", get_service(ServeDir::new(media_root)))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(Extension(glob));

    log::info!("Listening on {}", &addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
