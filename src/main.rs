use dutch::{config, http, room::RoomManager, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init(telemetry::LogFormat::from_env());

    let settings = config::game_settings()?;
    let hmac_key = config::hmac_key()?;
    let rooms = RoomManager::in_memory(settings);
    let app = http::router(http::AppState::new(rooms, hmac_key));

    let addr = config::server_addr();
    tracing::info!(%addr, ?settings, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
