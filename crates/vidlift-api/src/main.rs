use vidlift_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize the application (storage, coordinator, routes)
    let (state, router) = vidlift_api::setup::initialize_app(config.clone()).await?;

    let reaper = vidlift_api::setup::server::spawn_session_reaper(state.clone());

    // Start the server
    let result = vidlift_api::setup::server::start_server(&config, router).await;
    if let Some(reaper) = reaper {
        reaper.abort();
    }
    result
}
