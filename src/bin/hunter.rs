use hitchrust::config::Config;
use hitchrust::error::StartupError;
use hitchrust::server;

#[actix_rt::main]
async fn main() -> Result<(), StartupError> {
    server::init_logging();
    let config = Config::from_env()?;
    server::run_hunter(config).await
}
