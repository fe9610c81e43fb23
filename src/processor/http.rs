use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use url::Url;

use super::{PaymentProcessor, ProcessorError, ProcessorReceipt};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub base_url: Option<Url>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// HTTP client for the external payment processor.
///
/// Every call carries a bounded timeout and runs behind a consecutive-failure
/// circuit breaker. Only outages (timeouts, network errors, 5xx) count
/// towards tripping the breaker.
#[derive(Clone)]
pub struct HttpPaymentProcessor {
    client: Client,
    config: ProcessorConfig,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl HttpPaymentProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self::with_circuit_breaker(config, 3, 60)
    }

    pub fn with_circuit_breaker(
        config: ProcessorConfig,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Self {
            client,
            config,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }

    fn endpoint(&self, external_ref: &str, action: &str) -> Result<Url, ProcessorError> {
        let mut url = self.config.base_url.clone().ok_or_else(|| {
            ProcessorError::Configuration("PROCESSOR_BASE_URL is not set".to_string())
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                ProcessorError::Configuration("PROCESSOR_BASE_URL cannot be a base".to_string())
            })?
            .pop_if_empty()
            .extend(&["payments", external_ref, action]);
        Ok(url)
    }

    async fn post(
        &self,
        url: Url,
        body: serde_json::Value,
    ) -> Result<ProcessorReceipt, ProcessorError> {
        let api_key = self.config.api_key.clone().ok_or_else(|| {
            ProcessorError::Configuration("PROCESSOR_API_KEY is not set".to_string())
        })?;
        let request = self.client.post(url).bearer_auth(api_key).json(&body);
        let timeout = self.config.timeout;

        let call = async move {
            match tokio::time::timeout(timeout, async move {
                let response = request.send().await.map_err(classify)?;
                read_receipt(response).await
            })
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProcessorError::Timeout),
            }
        };

        match self.circuit_breaker.call_with(is_outage, call).await {
            Ok(receipt) => Ok(receipt),
            Err(FailsafeError::Rejected) => Err(ProcessorError::Network(
                "payment processor circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

fn is_outage(err: &ProcessorError) -> bool {
    matches!(err, ProcessorError::Timeout | ProcessorError::Network(_))
}

fn classify(err: reqwest::Error) -> ProcessorError {
    if err.is_timeout() {
        ProcessorError::Timeout
    } else {
        ProcessorError::Network(err.to_string())
    }
}

async fn read_receipt(response: reqwest::Response) -> Result<ProcessorReceipt, ProcessorError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<ProcessorReceipt>()
            .await
            .map_err(|e| ProcessorError::Network(format!("unreadable processor response: {}", e)));
    }

    let detail = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProcessorError::Configuration(
            format!("processor refused credentials ({})", status),
        )),
        s if s.is_client_error() => Err(ProcessorError::Rejected(if detail.is_empty() {
            s.to_string()
        } else {
            detail
        })),
        s => Err(ProcessorError::Network(format!("processor returned {}", s))),
    }
}

#[async_trait::async_trait]
impl PaymentProcessor for HttpPaymentProcessor {
    async fn approve(&self, external_ref: &str) -> Result<ProcessorReceipt, ProcessorError> {
        let url = self.endpoint(external_ref, "approve")?;
        self.post(url, json!({})).await
    }

    async fn complete(
        &self,
        external_ref: &str,
        tx_reference: &str,
    ) -> Result<ProcessorReceipt, ProcessorError> {
        let url = self.endpoint(external_ref, "complete")?;
        self.post(url, json!({ "transaction_reference": tx_reference }))
            .await
    }
}
