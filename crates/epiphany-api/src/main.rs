use epiphany_api::setup;
use epiphany_core::Config;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    epiphany_infra::init_telemetry(config.log_json)
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let (_state, router, pools) = setup::initialize_app(config.clone()).await?;

    let served = setup::server::start_server(&config, router).await;

    setup::workers::shutdown_workers(&pools).await;
    epiphany_infra::shutdown_telemetry().await;

    served
}
