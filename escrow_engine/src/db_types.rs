use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use escrow_common::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {field}: {value}")]
pub struct ConversionError {
    pub field: &'static str,
    pub value: String,
}

impl ConversionError {
    pub fn new<S: Into<String>>(field: &'static str, value: S) -> Self {
        Self { field, value: value.into() }
    }
}

/// Implements `Display` and `FromStr` for a unit-only enum using the same snake_case strings that serde and the
/// database use.
macro_rules! string_enum {
    ($name:ident, $field:literal, { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s,)+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    other => Err(ConversionError::new($field, other)),
                }
            }
        }
    };
}

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
/// The fulfillment state of an order. This is tracked independently of [`PaymentStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    UnderReview,
    RefundRequested,
    Refunded,
    Cancelled,
    Completed,
}

string_enum!(OrderStatusType, "order status", {
    Pending => "pending",
    Confirmed => "confirmed",
    Shipped => "shipped",
    Delivered => "delivered",
    UnderReview => "under_review",
    RefundRequested => "refund_requested",
    Refunded => "refunded",
    Cancelled => "cancelled",
    Completed => "completed",
});

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded | Self::Completed)
    }

    /// Legal fulfillment transitions.
    ///
    /// | From \ To        | confirmed | shipped | delivered | under_review | refund_requested | refunded | cancelled | completed |
    /// |------------------|-----------|---------|-----------|--------------|------------------|----------|-----------|-----------|
    /// | pending          | ✔         | ✔       | ✔         |              |                  |          | ✔         |           |
    /// | confirmed        |           | ✔       | ✔         |              |                  |          | ✔         |           |
    /// | shipped          |           |         | ✔         | ✔            |                  |          |           |           |
    /// | delivered        |           |         |           | ✔            | ✔                |          |           | ✔         |
    /// | under_review     |           |         | ✔         |              | ✔                |          |           | ✔         |
    /// | refund_requested |           |         |           | ✔            |                  | ✔        |           |           |
    ///
    /// Terminal states (refunded, cancelled, completed) have no outgoing transitions.
    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        use OrderStatusType::*;
        matches!(
            (self, next),
            (Pending, Confirmed | Shipped | Delivered | Cancelled) |
                (Confirmed, Shipped | Delivered | Cancelled) |
                (Shipped, Delivered | UnderReview) |
                (Delivered, UnderReview | RefundRequested | Completed) |
                (UnderReview, Delivered | RefundRequested | Completed) |
                (RefundRequested, UnderReview | Refunded)
        )
    }

    /// The statuses from which `next` can be reached.
    pub fn predecessors_of(next: OrderStatusType) -> Vec<OrderStatusType> {
        use OrderStatusType::*;
        [Pending, Confirmed, Shipped, Delivered, UnderReview, RefundRequested, Refunded, Cancelled, Completed]
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }
}

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
/// The money axis of an order. Payment is captured at checkout, so new orders start out as `Paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    PendingVerification,
    Released,
    Refunded,
    Failed,
    Cancelled,
}

string_enum!(PaymentStatus, "payment status", {
    Pending => "pending",
    Paid => "paid",
    PendingVerification => "pending_verification",
    Released => "released",
    Refunded => "refunded",
    Failed => "failed",
    Cancelled => "cancelled",
});

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Paid | Cancelled) | (Paid, Released | Refunded | Failed) | (PendingVerification, Paid | Failed)
        )
    }
}

//--------------------------------------     PayoutMethod      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    BankTransfer,
    MobileMoneyA,
    MobileMoneyB,
    Manual,
}

string_enum!(PayoutMethod, "payout method", {
    BankTransfer => "bank_transfer",
    MobileMoneyA => "mobile_money_a",
    MobileMoneyB => "mobile_money_b",
    Manual => "manual",
});

impl PayoutMethod {
    pub fn description(&self) -> &'static str {
        match self {
            Self::BankTransfer => "bank transfer",
            Self::MobileMoneyA => "mobile money (A)",
            Self::MobileMoneyB => "mobile money (B)",
            Self::Manual => "manual payout",
        }
    }
}

//--------------------------------------    ReleaseTrigger     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseTrigger {
    /// An admin asked for the payment to be released.
    Manual,
    /// The auto-release sweep found the order past its release date.
    Automatic,
}

string_enum!(ReleaseTrigger, "release trigger", {
    Manual => "manual",
    Automatic => "automatic",
});

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub buyer_id: String,
    pub seller_id: String,
    /// Gross amount paid by the buyer
    pub amount: Money,
    pub commission_rate: Decimal,
    /// Frozen at checkout. Never recomputed.
    pub commission_amount: Money,
    /// Frozen at checkout. Never recomputed.
    pub seller_amount: Money,
    pub status: OrderStatusType,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub auto_release_date: Option<DateTime<Utc>>,
    pub transferred_at: Option<DateTime<Utc>>,
    pub transfer_reference: Option<String>,
    pub payment_method: Option<PayoutMethod>,
    pub release_trigger: Option<ReleaseTrigger>,
    pub release_attempts: i64,
    pub last_release_error: Option<String>,
}

impl Order {
    pub fn is_released(&self) -> bool {
        self.payment_status == PaymentStatus::Released
    }
}

//--------------------------------------       NewOrder        ---------------------------------------------------------
/// An order as it arrives from checkout. The commission split is computed exactly once, here.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub buyer_id: String,
    pub seller_id: String,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
    commission_rate: Decimal,
    commission_amount: Money,
    seller_amount: Money,
}

impl NewOrder {
    pub fn new<B: Into<String>, S: Into<String>>(
        order_id: OrderId,
        buyer_id: B,
        seller_id: S,
        amount: Money,
        commission_rate: Decimal,
    ) -> Self {
        let commission_amount = amount.percentage(commission_rate);
        let seller_amount = amount - commission_amount;
        Self {
            order_id,
            buyer_id: buyer_id.into(),
            seller_id: seller_id.into(),
            amount,
            created_at: Utc::now(),
            commission_rate,
            commission_amount,
            seller_amount,
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn commission_rate(&self) -> Decimal {
        self.commission_rate
    }

    pub fn commission_amount(&self) -> Money {
        self.commission_amount
    }

    pub fn seller_amount(&self) -> Money {
        self.seller_amount
    }
}

//--------------------------------------     BankAccount       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub account_name: String,
    pub account_number: String,
    pub bank_code: String,
}

impl BankAccount {
    pub fn new<A: Into<String>, N: Into<String>, C: Into<String>>(name: A, number: N, code: C) -> Self {
        Self { account_name: name.into(), account_number: number.into(), bank_code: code.into() }
    }

    pub fn is_complete(&self) -> bool {
        !self.account_number.trim().is_empty() && !self.bank_code.trim().is_empty()
    }
}

//--------------------------------------     PayoutProfile     ---------------------------------------------------------
/// The payout details a seller has configured. Any subset of the channels may be filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutProfile {
    pub seller_id: String,
    pub bank: Option<BankAccount>,
    pub mobile_money_a: Option<String>,
    pub mobile_money_b: Option<String>,
    pub other_instructions: Option<String>,
    /// Recipient token issued by the bank-transfer provider. A cache, not a source of truth.
    pub gateway_recipient_id: Option<String>,
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()).map(String::from)
}

impl PayoutProfile {
    pub fn new<S: Into<String>>(seller_id: S) -> Self {
        Self { seller_id: seller_id.into(), ..Default::default() }
    }

    pub fn with_bank(mut self, bank: BankAccount) -> Self {
        self.bank = Some(bank);
        self
    }

    pub fn with_mobile_money_a<S: Into<String>>(mut self, phone: S) -> Self {
        self.mobile_money_a = Some(phone.into());
        self
    }

    pub fn with_mobile_money_b<S: Into<String>>(mut self, phone: S) -> Self {
        self.mobile_money_b = Some(phone.into());
        self
    }

    pub fn with_other_instructions<S: Into<String>>(mut self, instructions: S) -> Self {
        self.other_instructions = Some(instructions.into());
        self
    }

    /// Selects exactly one payout channel, in fixed priority order: bank > mobile money A > mobile money B > other.
    /// Returns `None` if the seller has not configured anything usable.
    pub fn resolve_channel(&self) -> Option<PayoutChannel> {
        if let Some(bank) = self.bank.as_ref().filter(|b| b.is_complete()) {
            return Some(PayoutChannel::Bank {
                account: bank.clone(),
                recipient_id: present(&self.gateway_recipient_id),
            });
        }
        if let Some(phone) = present(&self.mobile_money_a) {
            return Some(PayoutChannel::MobileMoneyA { phone });
        }
        if let Some(phone) = present(&self.mobile_money_b) {
            return Some(PayoutChannel::MobileMoneyB { phone });
        }
        present(&self.other_instructions).map(|instructions| PayoutChannel::Manual { instructions })
    }
}

//--------------------------------------     PayoutChannel     ---------------------------------------------------------
/// The single destination chosen for one payout attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PayoutChannel {
    Bank { account: BankAccount, recipient_id: Option<String> },
    MobileMoneyA { phone: String },
    MobileMoneyB { phone: String },
    Manual { instructions: String },
}

impl PayoutChannel {
    pub fn method(&self) -> PayoutMethod {
        match self {
            Self::Bank { .. } => PayoutMethod::BankTransfer,
            Self::MobileMoneyA { .. } => PayoutMethod::MobileMoneyA,
            Self::MobileMoneyB { .. } => PayoutMethod::MobileMoneyB,
            Self::Manual { .. } => PayoutMethod::Manual,
        }
    }
}

//--------------------------------------   CommissionStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Collected,
}

string_enum!(CommissionStatus, "commission status", {
    Collected => "collected",
});

//--------------------------------------   CommissionRecord    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRecord {
    pub order_id: OrderId,
    pub amount: Money,
    pub rate: Decimal,
    pub status: CommissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommission {
    pub order_id: OrderId,
    pub amount: Money,
    pub rate: Decimal,
}

impl NewCommission {
    /// The commission owed on an order, taken from the values frozen at checkout.
    pub fn for_order(order: &Order) -> Self {
        Self { order_id: order.order_id.clone(), amount: order.commission_amount, rate: order.commission_rate }
    }
}

//--------------------------------------     ReleaseClaim      ---------------------------------------------------------
/// A short-lived lock on an order's release, taken before any payout gateway is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseClaim {
    pub token: String,
    pub claimed_at: DateTime<Utc>,
    /// Claims older than this may be taken over.
    pub stale_after: Duration,
}

impl ReleaseClaim {
    pub fn new(claimed_at: DateTime<Utc>, stale_after: Duration) -> Self {
        let token = format!("{:016x}{:016x}", rand::random::<u64>(), rand::random::<u64>());
        Self { token, claimed_at, stale_after }
    }

    pub fn stale_before(&self) -> DateTime<Utc> {
        self.claimed_at - self.stale_after
    }
}

//--------------------------------------     ReleaseRecord     ---------------------------------------------------------
/// Everything that gets committed when an order's payment is released.
#[derive(Debug, Clone)]
pub struct ReleaseRecord {
    /// When set, the release is only committed if this claim is still held.
    pub claim_token: Option<String>,
    pub method: PayoutMethod,
    pub reference: String,
    pub trigger: ReleaseTrigger,
    pub released_at: DateTime<Utc>,
    pub commission: NewCommission,
}

//--------------------------------------         Role          ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Seller,
    Admin,
}

string_enum!(Role, "role", {
    User => "user",
    Seller => "seller",
    Admin => "admin",
});
