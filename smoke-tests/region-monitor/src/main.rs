use anyhow::Result;
use chrono::Utc;
use region_monitor_smoke::{LambdaRegionMonitor, SmokeTest, SmokeTestConfig, SnsAlertTopic};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = SmokeTestConfig::from_env();
    config.validate()?;

    println!(
        "Starting region monitor smoke test at {}",
        Utc::now().to_rfc3339()
    );
    info!(
        monitor_function = %config.monitor_function,
        monitor_region = %config.monitor_region,
        alert_topic = %config.alert_topic_arn,
        api_gateway = %config.api_gateway_id,
        "starting smoke test"
    );

    let monitor = LambdaRegionMonitor::new(&config).await;
    let alerts = SnsAlertTopic::new(&config).await;

    let outcome = SmokeTest::new(config, monitor, alerts).run().await;
    info!(verdict = ?outcome.verdict, "smoke test finished");

    Ok(())
}
