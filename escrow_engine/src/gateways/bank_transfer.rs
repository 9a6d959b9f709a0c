use std::time::Duration;

use async_trait::async_trait;
use escrow_common::Secret;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    db_types::{BankAccount, PayoutChannel, PayoutMethod},
    gateways::{with_timeout, PayoutGateway, PayoutRequest, TransferError, TransferReceipt, DEFAULT_GATEWAY_TIMEOUT},
};

#[derive(Debug, Clone)]
pub struct BankTransferConfig {
    /// e.g. `https://api.paystack.co`
    pub api_url: String,
    pub secret_key: Secret<String>,
    /// ISO currency code sent with new transfer recipients
    pub currency: String,
    pub timeout: Duration,
}

impl Default for BankTransferConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.paystack.co".to_string(),
            secret_key: Secret::default(),
            currency: "NGN".to_string(),
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }
}

/// Pays sellers out by bank transfer through a REST transfer API.
///
/// The provider needs a *recipient* for every destination account. If the seller's profile has no cached recipient
/// id, one is created first and handed back so the caller can cache it: in the receipt, or in
/// [`TransferError::AfterNewRecipient`] when the transfer itself fails.
#[derive(Clone)]
pub struct BankTransferGateway {
    config: BankTransferConfig,
    client: Client,
}

/// The envelope every provider response is wrapped in.
#[derive(Debug, Deserialize)]
struct ProviderResponse<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct NewRecipient<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    account_number: &'a str,
    bank_code: &'a str,
    currency: &'a str,
}

#[derive(Debug, Deserialize)]
struct RecipientData {
    recipient_code: String,
}

#[derive(Debug, Serialize)]
struct NewTransfer<'a> {
    source: &'static str,
    /// In minor units
    amount: i64,
    recipient: &'a str,
    reason: &'a str,
    reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct TransferData {
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    transfer_code: Option<String>,
}

impl BankTransferGateway {
    pub fn new(config: BankTransferConfig) -> Result<Self, TransferError> {
        let mut headers = HeaderMap::with_capacity(2);
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.secret_key.reveal()))
            .map_err(|e| TransferError::Provider(format!("Invalid bank API key: {e}")))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransferError::Network(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url.trim_end_matches('/'))
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, TransferError> {
        let url = self.url(path);
        trace!("🏦 POST {url}");
        let response =
            self.client.post(url).json(body).send().await.map_err(|e| TransferError::Network(e.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| TransferError::Network(e.to_string()))?;
        parse_provider_response(status.is_success(), status.as_u16(), &text)
    }

    /// Registers the account with the provider and returns the new recipient code.
    pub async fn create_recipient(&self, account: &BankAccount) -> Result<String, TransferError> {
        let body = NewRecipient {
            kind: "nuban",
            name: &account.account_name,
            account_number: &account.account_number,
            bank_code: &account.bank_code,
            currency: &self.config.currency,
        };
        let data: RecipientData = self.post("/transferrecipient", &body).await?;
        info!("🏦 Created transfer recipient {} for account ending {}", data.recipient_code, last4(account));
        Ok(data.recipient_code)
    }

    async fn send_transfer(&self, recipient: &str, request: &PayoutRequest) -> Result<String, TransferError> {
        let amount = request.amount.to_minor_units().map_err(|e| TransferError::InvalidAmount(e.to_string()))?;
        if amount <= 0 {
            return Err(TransferError::InvalidAmount(format!("{} is not a positive amount", request.amount)));
        }
        let body = NewTransfer {
            source: "balance",
            amount,
            recipient,
            reason: &request.reason,
            reference: &request.idempotency_key,
        };
        let data: TransferData = self.post("/transfer", &body).await?;
        data.reference
            .or(data.transfer_code)
            .ok_or_else(|| TransferError::MalformedResponse("Transfer response carried no reference".to_string()))
    }
}

fn last4(account: &BankAccount) -> &str {
    let n = &account.account_number;
    n.char_indices().rev().nth(3).map(|(i, _)| &n[i..]).unwrap_or(n)
}

fn parse_provider_response<T: DeserializeOwned>(success: bool, status: u16, body: &str) -> Result<T, TransferError> {
    let parsed = serde_json::from_str::<ProviderResponse<T>>(body);
    match (success, parsed) {
        (true, Ok(ProviderResponse { status: true, data: Some(data), .. })) => Ok(data),
        (true, Ok(ProviderResponse { status: true, data: None, .. })) => {
            Err(TransferError::MalformedResponse("Response carried no data".to_string()))
        },
        (_, Ok(ProviderResponse { message, .. })) => Err(TransferError::Provider(format!("({status}) {message}"))),
        (true, Err(e)) => Err(TransferError::MalformedResponse(e.to_string())),
        (false, Err(_)) => Err(TransferError::Provider(format!("({status}) {body}"))),
    }
}

#[async_trait]
impl PayoutGateway for BankTransferGateway {
    fn method(&self) -> PayoutMethod {
        PayoutMethod::BankTransfer
    }

    async fn transfer(&self, channel: &PayoutChannel, request: &PayoutRequest) -> Result<TransferReceipt, TransferError> {
        let PayoutChannel::Bank { account, recipient_id } = channel else {
            return Err(TransferError::InvalidChannel {
                method: self.method(),
                reason: format!("Expected bank details, got {}", channel.method()),
            });
        };
        let (recipient, created) = match recipient_id {
            Some(id) => (id.clone(), false),
            None => (with_timeout(self.config.timeout, self.create_recipient(account)).await?, true),
        };
        let sent = with_timeout(self.config.timeout, self.send_transfer(&recipient, request)).await;
        match (sent, created) {
            (Ok(reference), true) => {
                Ok(TransferReceipt::new(reference, PayoutMethod::BankTransfer).with_recipient_id(recipient))
            },
            (Ok(reference), false) => Ok(TransferReceipt::new(reference, PayoutMethod::BankTransfer)),
            (Err(e), true) => Err(e.with_new_recipient(recipient)),
            (Err(e), false) => Err(e),
        }
    }
}
