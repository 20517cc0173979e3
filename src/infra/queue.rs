use anyhow::{anyhow, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_sqs::error::SdkError;
use aws_sdk_sqs::Client;
use chrono::Utc;
use serde::Serialize;
use std::sync::Mutex;
use tracing::debug;

use crate::config::AppConfig;
use crate::domain::notification::EmailMessage;

/// Hands outgoing email to the delivery service.
#[async_trait::async_trait]
pub trait MailQueue: Send + Sync {
    async fn enqueue(&self, message: &EmailMessage) -> Result<()>;
}

/// Body written to the queue, consumed by the mail delivery worker.
#[derive(Serialize)]
struct QueuedEmail<'a> {
    #[serde(flatten)]
    message: &'a EmailMessage,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Clone)]
pub struct SqsMailQueue {
    client: Client,
    queue_url: String,
}

impl SqsMailQueue {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let region_provider = RegionProviderChain::first_try(Region::new(config.queue_region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut sqs_builder = aws_sdk_sqs::config::Builder::from(&shared_config)
            .region(shared_config.region().cloned())
            .endpoint_url(config.queue_endpoint.clone());
        if let Some(provider) = shared_config.credentials_provider() {
            sqs_builder = sqs_builder.credentials_provider(provider);
        }
        let client = Client::from_conf(sqs_builder.build());

        let queue_url = match client
            .get_queue_url()
            .queue_name(&config.queue_name)
            .send()
            .await
        {
            Ok(response) => response
                .queue_url()
                .ok_or_else(|| anyhow!("missing queue url"))?
                .to_string(),
            Err(SdkError::ServiceError(service_err))
                if service_err.err().is_queue_does_not_exist() =>
            {
                let created = client
                    .create_queue()
                    .queue_name(&config.queue_name)
                    .send()
                    .await?;
                created
                    .queue_url()
                    .ok_or_else(|| anyhow!("missing queue url"))?
                    .to_string()
            }
            Err(err) => return Err(anyhow!(err)),
        };

        Ok(Self { client, queue_url })
    }
}

#[async_trait::async_trait]
impl MailQueue for SqsMailQueue {
    async fn enqueue(&self, message: &EmailMessage) -> Result<()> {
        let body = serde_json::to_string(&QueuedEmail {
            message,
            created_at: Utc::now(),
        })?;
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await?;

        debug!(to = %message.to, subject = %message.subject, "email queued");
        Ok(())
    }
}

/// Records queued messages instead of sending them.
#[derive(Default)]
pub struct InMemoryMailQueue {
    messages: Mutex<Vec<EmailMessage>>,
    unavailable: Mutex<bool>,
}

impl InMemoryMailQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<EmailMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// While unavailable every enqueue fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }
}

#[async_trait::async_trait]
impl MailQueue for InMemoryMailQueue {
    async fn enqueue(&self, message: &EmailMessage) -> Result<()> {
        if *self.unavailable.lock().unwrap() {
            return Err(anyhow!("mail queue unavailable"));
        }
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}
