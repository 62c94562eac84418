use consent_ledger::config::get_configuration;
use consent_ledger::startup::Application;
use consent_ledger::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let subscriber = get_subscriber(
        String::from("consent_ledger"),
        String::from("info"),
        std::io::stdout,
    );
    init_subscriber(subscriber);

    let config = get_configuration()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let application = Application::build(config).await?;

    application.run_until_stop().await
}
