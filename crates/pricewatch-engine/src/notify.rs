//! Outbound price alerts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pricewatch_core::Marketplace;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::NotifyError;

const PUSHPLUS_URL: &str = "http://www.pushplus.plus/send";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceAlert {
    pub item_name: String,
    pub marketplace: Marketplace,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub change_text: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_price_alert(&self, alert: &PriceAlert) -> Result<(), NotifyError>;
}

/// Sends `alert` on a background task. Delivery failures are logged only.
pub fn dispatch(notifier: &Arc<dyn Notifier>, alert: PriceAlert) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(e) = notifier.send_price_alert(&alert).await {
            tracing::warn!(
                item = %alert.item_name,
                marketplace = %alert.marketplace,
                error = %e,
                "price alert delivery failed"
            );
        }
    });
}

/// Writes alerts to the log; used when no push token is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_price_alert(&self, alert: &PriceAlert) -> Result<(), NotifyError> {
        tracing::warn!(
            item = %alert.item_name,
            marketplace = %alert.marketplace,
            old_price = %alert.old_price,
            new_price = %alert.new_price,
            change = %alert.change_text,
            "price alert"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct PushPlusMessage<'a> {
    token: &'a str,
    title: String,
    content: String,
    template: &'static str,
}

/// PushPlus HTML message delivery.
pub struct PushPlusNotifier {
    client: reqwest::Client,
    token: String,
    endpoint: String,
}

impl PushPlusNotifier {
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the HTTP client cannot be built.
    pub fn new(token: impl Into<String>) -> Result<Self, NotifyError> {
        Self::with_endpoint(token, PUSHPLUS_URL)
    }

    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the HTTP client cannot be built.
    pub fn with_endpoint(
        token: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            token: token.into(),
            endpoint: endpoint.into(),
        })
    }

    fn render(alert: &PriceAlert) -> (String, String) {
        let title = format!("Price alert: {} {}", alert.item_name, alert.change_text);
        let content = format!(
            "<h3>Abnormal price movement</h3>\
             <p><b>Item:</b> {}</p>\
             <p><b>Marketplace:</b> {}</p>\
             <hr/>\
             <p style='color:gray'>Previous price:</p><h2>{}</h2>\
             <p style='color:red'>Latest price:</p><h1 style='color:red'>{}</h1>\
             <p><b>Change:</b> {}</p>",
            alert.item_name, alert.marketplace, alert.old_price, alert.new_price, alert.change_text
        );
        (title, content)
    }
}

#[async_trait]
impl Notifier for PushPlusNotifier {
    async fn send_price_alert(&self, alert: &PriceAlert) -> Result<(), NotifyError> {
        let (title, content) = Self::render(alert);
        let message = PushPlusMessage {
            token: &self.token,
            title,
            content,
            template: "html",
        };

        let response = self.client.post(&self.endpoint).json(&message).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        tracing::info!(item = %alert.item_name, change = %alert.change_text, "price alert sent");
        Ok(())
    }
}
