use dotenvy::dotenv;
use tracing::info;

use points_ledger::infra::{
    app::create_app,
    config::AppConfig,
    setup::{init_app_state, init_tracing},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = AppConfig::from_env();
    init_tracing(config.log_json);

    let bind_addr = config.bind_addr;
    let app_state = init_app_state(config).await?;

    let app = create_app(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Points ledger listening at {}", &listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
