//! Record types persisted by the ledger, and the request types used to create them.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use merch_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

/// Implements `Display` and `FromStr` using the same upper-case names that are stored in the database.
macro_rules! db_enum_strings {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $text),)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    s => Err(ConversionError(format!("{s} is not a valid {}", stringify!($name)))),
                }
            }
        }
    };
}

//--------------------------------------        UserId        ---------------------------------------------------------
/// The identity of a user (customer or staff member), as assigned by the external authentication provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct UserId(pub String);

impl<S: Into<String>> From<S> for UserId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub i64);

impl From<i64> for OrderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

//--------------------------------------       PaymentId       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct PaymentId(pub i64);

impl From<i64> for PaymentId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

impl PaymentId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
/// The fulfillment lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusType {
    /// The order has been placed, but not paid for in full.
    Pending,
    /// The order is paid (or has been released by staff) and is being prepared.
    Processing,
    /// The order is ready for pickup or delivery.
    Ready,
    /// The customer has received the order.
    Delivered,
    /// The order has been cancelled by the customer or an admin.
    Cancelled,
}

db_enum_strings!(OrderStatusType {
    Pending => "PENDING",
    Processing => "PROCESSING",
    Ready => "READY",
    Delivered => "DELIVERED",
    Cancelled => "CANCELLED",
});

impl OrderStatusType {
    /// Position of the status along the forward fulfillment path. Cancelled orders sit outside the path.
    pub fn stage(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Processing => Some(1),
            Self::Ready => Some(2),
            Self::Delivered => Some(3),
            Self::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

//--------------------------------------  OrderPaymentStatus   ---------------------------------------------------------
/// The money lifecycle of an order. Always derived from the order's payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPaymentStatus {
    /// Nothing has been paid yet.
    Pending,
    /// Some, but not all, of the order total has been paid.
    Downpayment,
    /// The order total has been paid in full.
    Paid,
    /// Payments on the order have been refunded to zero (or below).
    Refunded,
}

db_enum_strings!(OrderPaymentStatus {
    Pending => "PENDING",
    Downpayment => "DOWNPAYMENT",
    Paid => "PAID",
    Refunded => "REFUNDED",
});

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Submitted, awaiting verification by staff.
    Pending,
    /// Confirmed by staff as received. Only verified payments count towards the amount paid.
    Verified,
    /// Rejected by staff.
    Declined,
    /// A refund entry.
    Refunded,
}

db_enum_strings!(PaymentStatus {
    Pending => "PENDING",
    Verified => "VERIFIED",
    Declined => "DECLINED",
    Refunded => "REFUNDED",
});

//--------------------------------------      PaymentKind      ---------------------------------------------------------
/// Ledger entries are either charges against the order, or refunds of an earlier charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentKind {
    Charge,
    Refund,
}

db_enum_strings!(PaymentKind {
    Charge => "CHARGE",
    Refund => "REFUND",
});

//--------------------------------------     PaymentMethod     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Gcash,
    BankTransfer,
    CreditCard,
    Other,
}

db_enum_strings!(PaymentMethod {
    Cash => "CASH",
    Gcash => "GCASH",
    BankTransfer => "BANK_TRANSFER",
    CreditCard => "CREDIT_CARD",
    Other => "OTHER",
});

//--------------------------------------      PaymentSite      ---------------------------------------------------------
/// Whether the payment was collected at the point of sale, or outside of it (e.g. a bank transfer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentSite {
    Onsite,
    Offsite,
}

db_enum_strings!(PaymentSite {
    Onsite => "ONSITE",
    Offsite => "OFFSITE",
});

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: UserId,
    pub customer_name: String,
    pub customer_email: String,
    pub processed_by_id: Option<UserId>,
    /// The amount owed. Set once, when the order is created.
    pub total_amount: Money,
    pub payment_status: OrderPaymentStatus,
    pub status: OrderStatusType,
    pub customer_notes: Option<String>,
    pub is_deleted: bool,
    /// Incremented by every transaction that mutates the order or its payments.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       OrderItem       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: OrderId,
    pub variant_id: String,
    pub quantity: i64,
    pub unit_price: Money,
}

impl OrderItem {
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub variant_id: String,
    pub quantity: i64,
    pub unit_price: Money,
}

impl NewOrderItem {
    pub fn new<S: Into<String>>(variant_id: S, quantity: i64, unit_price: Money) -> Self {
        Self { variant_id: variant_id.into(), quantity, unit_price }
    }

    /// `None` if the line total cannot be represented.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: UserId,
    /// Customer name and email are captured at checkout so that status emails can be addressed.
    pub customer_name: String,
    pub customer_email: String,
    pub items: Vec<NewOrderItem>,
    /// Subtracted from the sum of the line items to give the order total.
    pub discount: Money,
    pub customer_notes: Option<String>,
}

impl NewOrder {
    pub fn new<U, N, E>(customer_id: U, customer_name: N, customer_email: E) -> Self
    where
        U: Into<UserId>,
        N: Into<String>,
        E: Into<String>,
    {
        Self {
            customer_id: customer_id.into(),
            customer_name: customer_name.into(),
            customer_email: customer_email.into(),
            items: Vec::new(),
            discount: Money::ZERO,
            customer_notes: None,
        }
    }

    pub fn with_item(mut self, item: NewOrderItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.customer_notes = Some(notes.into());
        self
    }

    /// The sum of the line items, less the discount. `None` if the total overflows.
    pub fn total_amount(&self) -> Option<Money> {
        self.items
            .iter()
            .try_fold(Money::ZERO, |acc, item| item.line_total().and_then(|line| acc.checked_add(line)))?
            .checked_sub(self.discount)
    }
}

//--------------------------------------        Payment        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    /// The paying customer
    pub user_id: UserId,
    /// The staff member that recorded, verified or rejected the payment
    pub processed_by_id: Option<UserId>,
    pub kind: PaymentKind,
    /// Positive for charges, negative for refunds
    pub amount: Money,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub payment_site: PaymentSite,
    pub transaction_id: Option<String>,
    pub reference_no: Option<String>,
    pub memo: Option<String>,
    pub payment_provider: Option<String>,
    /// For refunds, the charge that was refunded
    pub refund_of: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_verified_charge(&self) -> bool {
        self.kind == PaymentKind::Charge && self.payment_status == PaymentStatus::Verified
    }

    pub fn is_refund(&self) -> bool {
        self.kind == PaymentKind::Refund
    }
}

//--------------------------------------       NewPayment      ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub payment_site: PaymentSite,
    /// Only `Pending` and `Verified` are accepted for new payments
    pub payment_status: PaymentStatus,
    pub reference_no: Option<String>,
    pub memo: Option<String>,
    pub transaction_id: Option<String>,
    pub payment_provider: Option<String>,
}

impl NewPayment {
    /// A new, verified payment.
    pub fn new(order_id: OrderId, amount: Money, payment_method: PaymentMethod, payment_site: PaymentSite) -> Self {
        Self {
            order_id,
            amount,
            payment_method,
            payment_site,
            payment_status: PaymentStatus::Verified,
            reference_no: None,
            memo: None,
            transaction_id: None,
            payment_provider: None,
        }
    }

    pub fn with_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = status;
        self
    }

    pub fn with_memo<S: Into<String>>(mut self, memo: S) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn with_reference_no<S: Into<String>>(mut self, reference_no: S) -> Self {
        self.reference_no = Some(reference_no.into());
        self
    }

    pub fn with_transaction_id<S: Into<String>>(mut self, txid: S) -> Self {
        self.transaction_id = Some(txid.into());
        self
    }

    pub fn with_provider<S: Into<String>>(mut self, provider: S) -> Self {
        self.payment_provider = Some(provider.into());
        self
    }

    pub fn is_offsite_pending(&self) -> bool {
        self.payment_site == PaymentSite::Offsite && self.payment_status == PaymentStatus::Pending
    }
}

//--------------------------------------     CustomerSurvey    ---------------------------------------------------------
/// Placeholder for the customer-satisfaction survey of a delivered order.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CustomerSurvey {
    pub id: i64,
    pub order_id: OrderId,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
}

//--------------------------------------     AuditLogEntry     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    /// The user the entry is about (usually the customer)
    pub user_id: UserId,
    /// The user that triggered the entry
    pub created_by_id: UserId,
    pub reason: String,
    /// Operator-facing description
    pub system_text: String,
    /// Customer-facing description
    pub user_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub user_id: UserId,
    pub created_by_id: UserId,
    pub reason: String,
    pub system_text: String,
    pub user_text: String,
}

impl NewAuditEntry {
    pub fn new<R: Into<String>>(user_id: &UserId, created_by_id: &UserId, reason: R) -> Self {
        Self {
            user_id: user_id.clone(),
            created_by_id: created_by_id.clone(),
            reason: reason.into(),
            system_text: String::new(),
            user_text: String::new(),
        }
    }

    pub fn with_system_text<S: Into<String>>(mut self, text: S) -> Self {
        self.system_text = text.into();
        self
    }

    pub fn with_user_text<S: Into<String>>(mut self, text: S) -> Self {
        self.user_text = text.into();
        self
    }
}
