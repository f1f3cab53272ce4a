use cartography::{build_default_sync, run_with_config, Config};
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Keep main small; everything testable lives in the library.
    log4rs::init_file("log4rs.yml", Default::default())?;
    dotenv::dotenv().ok();
    log::info!("#Start main()");

    let config = Config::from_env()?;
    let sync = build_default_sync();
    run_with_config(&sync, &config).await?;

    log::info!("#End main()");
    Ok(())
}
