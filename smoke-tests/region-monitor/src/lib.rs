use anyhow::{anyhow, Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_lambda::{
    primitives::Blob, types::InvocationType, Client as LambdaClient,
};
use aws_sdk_sns::Client as SnsClient;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

const DEFAULT_PRIMARY_REGION: &str = "eu-west-1";
const DEFAULT_MONITOR_REGION: &str = "eu-central-1";
const DEFAULT_MONITOR_FUNCTION: &str = "photo-blog-backup-RegionMonitorFunction-W3QFi9pufMrm";
const DEFAULT_ALERT_TOPIC_ARN: &str =
    "arn:aws:sns:eu-west-1:711387109786:photo-blog-group1-dev-system-alerts";
const DEFAULT_API_GATEWAY_ID: &str = "yqnlkhkymh";
const DEFAULT_TEST_MARKER: &str = "test_input";
const DEFAULT_DELIVERY_WAIT: Duration = Duration::from_secs(10);

// Confirmed subscriptions carry a real ARN; pending ones read "PendingConfirmation".
const CONFIRMED_SUBSCRIPTION_PREFIX: &str = "arn:aws:sns:";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MonitorRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Healthy,
    Warning,
    Triggered,
    Error,
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Warning => write!(f, "warning"),
            Self::Triggered => write!(f, "triggered"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Healthy,
    Unhealthy(MonitorStatus),
    Inconclusive,
}

impl Verdict {
    pub fn summary(&self) -> &'static str {
        match self {
            Self::Healthy => "Primary region is healthy. No notification expected.",
            Self::Unhealthy(_) => "Unhealthy condition detected. Checking for SNS notification...",
            Self::Inconclusive => "Test failed or no clear status returned.",
        }
    }
}

/// Maps the monitor function's decoded response onto the three-way decision:
/// healthy, unhealthy (verify the alert path), or no clear status at all.
pub fn classify(payload: Option<&Value>) -> Verdict {
    let Some(value) = payload else {
        return Verdict::Inconclusive;
    };

    let status = value
        .get("status")
        .and_then(|raw| serde_json::from_value::<MonitorStatus>(raw.clone()).ok());

    match status {
        Some(MonitorStatus::Healthy) => Verdict::Healthy,
        Some(status) => Verdict::Unhealthy(status),
        None => Verdict::Inconclusive,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicSubscription {
    pub protocol: String,
    pub endpoint: String,
    pub subscription_arn: String,
}

impl TopicSubscription {
    pub fn is_confirmed_email(&self) -> bool {
        self.protocol == "email"
            && self.subscription_arn.starts_with(CONFIRMED_SUBSCRIPTION_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Skipped,
    Confirmed(Vec<String>),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmokeTestOutcome {
    pub verdict: Verdict,
    pub verification: Verification,
}

#[derive(Builder, Debug, Clone)]
#[builder(on(String, into))]
pub struct SmokeTestConfig {
    #[builder(default = DEFAULT_PRIMARY_REGION.to_string())]
    pub primary_region: String,
    #[builder(default = DEFAULT_MONITOR_REGION.to_string())]
    pub monitor_region: String,
    #[builder(default = DEFAULT_MONITOR_FUNCTION.to_string())]
    pub monitor_function: String,
    #[builder(default = DEFAULT_ALERT_TOPIC_ARN.to_string())]
    pub alert_topic_arn: String,
    #[builder(default = DEFAULT_API_GATEWAY_ID.to_string())]
    pub api_gateway_id: String,
    #[builder(default = DEFAULT_TEST_MARKER.to_string())]
    pub test_marker: String,
    #[builder(default = DEFAULT_DELIVERY_WAIT)]
    pub delivery_wait: Duration,
}

impl SmokeTestConfig {
    pub fn from_env() -> Self {
        let delivery_wait = std::env::var("DELIVERY_WAIT_SECONDS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_DELIVERY_WAIT);

        Self::builder()
            .primary_region(env_or("PRIMARY_REGION", DEFAULT_PRIMARY_REGION))
            .monitor_region(env_or("MONITOR_REGION", DEFAULT_MONITOR_REGION))
            .monitor_function(env_or("MONITOR_FUNCTION_NAME", DEFAULT_MONITOR_FUNCTION))
            .alert_topic_arn(env_or("SYSTEM_ALERT_TOPIC", DEFAULT_ALERT_TOPIC_ARN))
            .api_gateway_id(env_or("API_GATEWAY_ID", DEFAULT_API_GATEWAY_ID))
            .test_marker(DEFAULT_TEST_MARKER)
            .delivery_wait(delivery_wait)
            .build()
    }

    pub fn validate(&self) -> Result<()> {
        if !validate_region(&self.primary_region) {
            return Err(anyhow!("invalid primary region: {:?}", self.primary_region));
        }
        if !validate_region(&self.monitor_region) {
            return Err(anyhow!("invalid monitor region: {:?}", self.monitor_region));
        }
        if self.monitor_function.is_empty() {
            return Err(anyhow!("monitor function name must not be empty"));
        }
        if self.alert_topic_arn.is_empty() {
            return Err(anyhow!("alert topic ARN must not be empty"));
        }
        if self.api_gateway_id.is_empty() {
            return Err(anyhow!("API gateway id must not be empty"));
        }
        Ok(())
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

pub fn validate_region(region: &str) -> bool {
    // Basic validation - in production, you'd check against a list of valid AWS regions
    !region.is_empty() && region.contains('-')
}

#[allow(async_fn_in_trait)]
pub trait RegionMonitor {
    async fn invoke(&self, request: &MonitorRequest) -> Result<Value>;
}

#[allow(async_fn_in_trait)]
pub trait AlertTopic {
    async fn subscriptions(&self, topic_arn: &str) -> Result<Vec<TopicSubscription>>;
}

pub struct LambdaRegionMonitor {
    lambda_client: LambdaClient,
    function_name: String,
}

impl LambdaRegionMonitor {
    pub async fn new(config: &SmokeTestConfig) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.monitor_region.clone()))
            .load()
            .await;

        Self {
            lambda_client: LambdaClient::new(&sdk_config),
            function_name: config.monitor_function.clone(),
        }
    }
}

impl RegionMonitor for LambdaRegionMonitor {
    async fn invoke(&self, request: &MonitorRequest) -> Result<Value> {
        let payload = serde_json::to_vec(request).context("serializing monitor request")?;

        let response = self
            .lambda_client
            .invoke()
            .function_name(&self.function_name)
            .invocation_type(InvocationType::RequestResponse)
            .payload(Blob::new(payload))
            .send()
            .await
            .context("invoking region monitor function")?;

        if let Some(function_error) = response.function_error() {
            warn!(error = function_error, "monitor function reported an execution error");
        }

        let blob = response
            .payload()
            .ok_or_else(|| anyhow!("monitor function returned no payload"))?;

        serde_json::from_slice(blob.as_ref()).context("decoding monitor response payload")
    }
}

pub struct SnsAlertTopic {
    sns_client: SnsClient,
}

impl SnsAlertTopic {
    pub async fn new(config: &SmokeTestConfig) -> Self {
        // The alert topic and its subscriptions live in the primary region.
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.primary_region.clone()))
            .load()
            .await;

        Self {
            sns_client: SnsClient::new(&sdk_config),
        }
    }
}

impl AlertTopic for SnsAlertTopic {
    async fn subscriptions(&self, topic_arn: &str) -> Result<Vec<TopicSubscription>> {
        let mut records = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut request = self
                .sns_client
                .list_subscriptions_by_topic()
                .topic_arn(topic_arn);

            if let Some(token) = next_token.take() {
                request = request.next_token(token);
            }

            let page = request
                .send()
                .await
                .context("listing alert topic subscriptions")?;

            for subscription in page.subscriptions() {
                records.push(TopicSubscription {
                    protocol: subscription.protocol().unwrap_or_default().to_string(),
                    endpoint: subscription.endpoint().unwrap_or_default().to_string(),
                    subscription_arn: subscription
                        .subscription_arn()
                        .unwrap_or_default()
                        .to_string(),
                });
            }

            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(records)
    }
}

pub struct SmokeTest<M, A> {
    config: SmokeTestConfig,
    monitor: M,
    alerts: A,
}

impl<M: RegionMonitor, A: AlertTopic> SmokeTest<M, A> {
    pub fn new(config: SmokeTestConfig, monitor: M, alerts: A) -> Self {
        Self {
            config,
            monitor,
            alerts,
        }
    }

    pub async fn run(&self) -> SmokeTestOutcome {
        println!("Invoking Lambda function...");

        let request = MonitorRequest {
            input: Some(self.config.test_marker.clone()),
        };

        let payload = match self.monitor.invoke(&request).await {
            Ok(value) => {
                println!("Lambda response: {value}");
                Some(value)
            }
            Err(e) => {
                error!("failed to invoke region monitor: {e:#}");
                println!("Error invoking Lambda: {e:#}");
                None
            }
        };

        let verdict = classify(payload.as_ref());
        println!("{}", verdict.summary());

        let verification = match &verdict {
            Verdict::Unhealthy(status) => {
                info!(status = %status, "unhealthy status reported, verifying alert path");
                self.verify_alert_subscriptions().await
            }
            Verdict::Healthy | Verdict::Inconclusive => Verification::Skipped,
        };

        SmokeTestOutcome {
            verdict,
            verification,
        }
    }

    async fn verify_alert_subscriptions(&self) -> Verification {
        // Give the downstream delivery pipeline time to act before checking.
        tokio::time::sleep(self.config.delivery_wait).await;

        match self.alerts.subscriptions(&self.config.alert_topic_arn).await {
            Ok(subscriptions) => {
                let endpoints: Vec<String> = subscriptions
                    .iter()
                    .filter(|sub| sub.is_confirmed_email())
                    .map(|sub| sub.endpoint.clone())
                    .collect();

                for endpoint in &endpoints {
                    println!("Subscription found: {endpoint} will receive notification");
                }

                if endpoints.is_empty() {
                    println!("No confirmed email subscriptions found on the alert topic.");
                }

                // Message content verification requires checking the inbox itself.
                println!("Check the admin email inbox for the notification.");

                Verification::Confirmed(endpoints)
            }
            Err(e) => {
                error!("failed to list alert topic subscriptions: {e:#}");
                println!("Error checking SNS: {e:#}");
                Verification::Failed(format!("{e:#}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_monitor_request_serialization() {
        let request = MonitorRequest {
            input: Some("test_input".to_string()),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"input":"test_input"}"#);

        let empty = MonitorRequest { input: None };
        assert_eq!(serde_json::to_string(&empty).unwrap(), "{}");
    }

    #[test]
    fn test_monitor_status_deserialization() {
        let status: MonitorStatus = serde_json::from_str(r#""healthy""#).unwrap();
        assert_eq!(status, MonitorStatus::Healthy);

        let status: MonitorStatus = serde_json::from_str(r#""triggered""#).unwrap();
        assert_eq!(status, MonitorStatus::Triggered);

        assert!(serde_json::from_str::<MonitorStatus>(r#""degraded""#).is_err());
        assert!(serde_json::from_str::<MonitorStatus>(r#""HEALTHY""#).is_err()); // case sensitive
    }

    #[test]
    fn test_monitor_status_display() {
        assert_eq!(MonitorStatus::Healthy.to_string(), "healthy");
        assert_eq!(MonitorStatus::Warning.to_string(), "warning");
        assert_eq!(MonitorStatus::Triggered.to_string(), "triggered");
        assert_eq!(MonitorStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_classify_healthy() {
        let payload = json!({"status": "healthy"});
        assert_eq!(classify(Some(&payload)), Verdict::Healthy);
    }

    #[test]
    fn test_classify_unhealthy_statuses() {
        for (raw, status) in [
            ("warning", MonitorStatus::Warning),
            ("triggered", MonitorStatus::Triggered),
            ("error", MonitorStatus::Error),
        ] {
            let payload = json!({ "status": raw });
            assert_eq!(classify(Some(&payload)), Verdict::Unhealthy(status));
        }
    }

    #[test]
    fn test_classify_inconclusive() {
        assert_eq!(classify(None), Verdict::Inconclusive);

        let missing = json!({"message": "no status here"});
        assert_eq!(classify(Some(&missing)), Verdict::Inconclusive);

        let unknown = json!({"status": "degraded"});
        assert_eq!(classify(Some(&unknown)), Verdict::Inconclusive);

        let wrong_type = json!({"status": 42});
        assert_eq!(classify(Some(&wrong_type)), Verdict::Inconclusive);
    }

    #[test]
    fn test_verdict_summaries() {
        assert_eq!(
            Verdict::Healthy.summary(),
            "Primary region is healthy. No notification expected."
        );
        assert_eq!(
            Verdict::Unhealthy(MonitorStatus::Triggered).summary(),
            "Unhealthy condition detected. Checking for SNS notification..."
        );
        assert_eq!(
            Verdict::Inconclusive.summary(),
            "Test failed or no clear status returned."
        );
    }

    #[test]
    fn test_subscription_filter() {
        let confirmed = TopicSubscription {
            protocol: "email".to_string(),
            endpoint: "admin@example.com".to_string(),
            subscription_arn: "arn:aws:sns:eu-west-1:711387109786:alerts:abc123".to_string(),
        };
        assert!(confirmed.is_confirmed_email());

        let pending = TopicSubscription {
            protocol: "email".to_string(),
            endpoint: "new@example.com".to_string(),
            subscription_arn: "PendingConfirmation".to_string(),
        };
        assert!(!pending.is_confirmed_email());

        let sms = TopicSubscription {
            protocol: "sms".to_string(),
            endpoint: "+1555000000".to_string(),
            subscription_arn: "arn:aws:sns:eu-west-1:711387109786:alerts:def456".to_string(),
        };
        assert!(!sms.is_confirmed_email());
    }

    #[test]
    fn test_config_defaults() {
        let config = SmokeTestConfig::builder().build();

        assert_eq!(config.primary_region, "eu-west-1");
        assert_eq!(config.monitor_region, "eu-central-1");
        assert_eq!(
            config.monitor_function,
            "photo-blog-backup-RegionMonitorFunction-W3QFi9pufMrm"
        );
        assert_eq!(
            config.alert_topic_arn,
            "arn:aws:sns:eu-west-1:711387109786:photo-blog-group1-dev-system-alerts"
        );
        assert_eq!(config.api_gateway_id, "yqnlkhkymh");
        assert_eq!(config.test_marker, "test_input");
        assert_eq!(config.delivery_wait, Duration::from_secs(10));
    }

    #[test]
    fn test_config_validation() {
        assert!(SmokeTestConfig::builder().build().validate().is_ok());

        let bad_region = SmokeTestConfig::builder().primary_region("useast1").build();
        assert!(bad_region.validate().is_err());

        let empty_topic = SmokeTestConfig::builder().alert_topic_arn("").build();
        assert!(empty_topic.validate().is_err());

        let empty_function = SmokeTestConfig::builder().monitor_function("").build();
        assert!(empty_function.validate().is_err());

        let empty_gateway = SmokeTestConfig::builder().api_gateway_id("").build();
        assert!(empty_gateway.validate().is_err());
    }

    #[test]
    fn test_validate_region() {
        assert!(validate_region("eu-west-1"));
        assert!(validate_region("eu-central-1"));
        assert!(!validate_region("invalid"));
        assert!(!validate_region(""));
    }
}
