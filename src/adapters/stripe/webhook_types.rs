//! Stripe wire types.
//!
//! These types mirror the Stripe objects the billing gateway reads, either from
//! webhook payloads or from REST responses. Only the fields the reconciler
//! needs are modelled; everything else is ignored by serde.

use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════════════════════
// Signature Parsing
// ════════════════════════════════════════════════════════════════════════════════

/// Error parsing the Stripe-Signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureParseError {
    /// Header is empty.
    MissingHeader,
    /// Missing timestamp component (t=...).
    MissingTimestamp,
    /// Missing v1 signature component.
    MissingV1Signature,
    /// Invalid timestamp format.
    InvalidTimestamp,
    /// Signature is not valid hex.
    InvalidSignatureFormat,
}

impl std::fmt::Display for SignatureParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "Missing stripe-signature header"),
            Self::MissingTimestamp => write!(f, "Missing timestamp (t=) in signature"),
            Self::MissingV1Signature => write!(f, "Missing v1 signature in header"),
            Self::InvalidTimestamp => write!(f, "Invalid timestamp format"),
            Self::InvalidSignatureFormat => write!(f, "Invalid signature format (not valid hex)"),
        }
    }
}

impl std::error::Error for SignatureParseError {}

/// Parsed Stripe-Signature header: `t=<unix>,v1=<hex>[,v1=<hex>...]`.
///
/// Stripe sends one `v1` entry per active signing secret while a secret is
/// being rolled, so all of them are kept.
#[derive(Debug, Clone)]
pub struct SignatureHeader {
    /// Unix timestamp Stripe signed alongside the payload.
    pub timestamp: i64,

    /// HMAC-SHA256 signatures, decoded.
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        let header = header.trim();
        if header.is_empty() {
            return Err(SignatureParseError::MissingHeader);
        }

        let mut timestamp = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => {
                    let parsed = value
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| SignatureParseError::InvalidTimestamp)?;
                    timestamp = Some(parsed);
                }
                "v1" => {
                    let decoded = hex_decode(value.trim())
                        .ok_or(SignatureParseError::InvalidSignatureFormat)?;
                    v1_signatures.push(decoded);
                }
                // v0 and unknown schemes are not verified
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureParseError::MissingTimestamp)?;
        if v1_signatures.is_empty() {
            return Err(SignatureParseError::MissingV1Signature);
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

/// Lowercase hex encoding.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ════════════════════════════════════════════════════════════════════════════════
// Event Envelope
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe webhook event envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeWebhookEvent {
    /// Event identifier (evt_...).
    pub id: String,

    /// Event type (e.g., "customer.subscription.updated").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp when the event was created. Hand-written test-mode
    /// bodies may omit it; 0 then means unknown.
    #[serde(default)]
    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,
}

/// Event data container.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The object the event is about.
    pub object: serde_json::Value,
}

impl StripeWebhookEvent {
    /// Subscription id the event refers to, if any.
    pub fn subscription_id(&self) -> Option<String> {
        if self.event_type.starts_with("customer.subscription.") {
            return self
                .data
                .object
                .get("id")
                .and_then(|v| v.as_str())
                .map(String::from);
        }
        self.data
            .object
            .get("subscription")
            .and_then(expandable_id)
    }

    /// Customer id the event refers to, if any.
    pub fn customer_id(&self) -> Option<String> {
        self.data.object.get("customer").and_then(expandable_id)
    }
}

/// Id of a field Stripe may return either as a string or as an expanded object.
fn expandable_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(id) => Some(id.clone()),
        serde_json::Value::Object(map) => map.get("id").and_then(|v| v.as_str()).map(String::from),
        _ => None,
    }
}

/// A reference Stripe may send unexpanded (`"cus_123"`) or expanded (`{"id": ...}`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object { id } => id,
        }
    }

    pub fn into_id(self) -> String {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object { id } => id,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe Objects
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe Customer object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCustomer {
    /// Customer identifier (cus_...).
    pub id: String,

    pub email: Option<String>,

    pub name: Option<String>,
}

/// Stripe Checkout Session object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCheckoutSession {
    /// Session identifier (cs_...).
    pub id: String,

    /// Hosted checkout page. Absent once the session is complete or expired.
    pub url: Option<String>,
}

/// Stripe Subscription object.
///
/// Newer API versions report the billing period on the subscription items
/// instead of the subscription itself, so both places are read.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscription {
    /// Subscription identifier (sub_...).
    pub id: String,

    pub customer: Expandable,

    pub status: String,

    pub current_period_start: Option<i64>,

    pub current_period_end: Option<i64>,

    #[serde(default)]
    pub cancel_at_period_end: bool,

    pub canceled_at: Option<i64>,

    #[serde(default)]
    pub items: StripeSubscriptionItems,
}

impl StripeSubscription {
    /// Billing period start, from the subscription or its first item.
    pub fn period_start(&self) -> Option<i64> {
        self.current_period_start
            .or_else(|| self.items.data.first().and_then(|i| i.current_period_start))
    }

    /// Billing period end, from the subscription or its first item.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end
            .or_else(|| self.items.data.first().and_then(|i| i.current_period_end))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StripeSubscriptionItems {
    #[serde(default)]
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscriptionItem {
    pub id: String,

    pub current_period_start: Option<i64>,

    pub current_period_end: Option<i64>,
}

/// Stripe Invoice object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeInvoice {
    /// Invoice identifier (in_...).
    pub id: String,

    pub customer: Option<Expandable>,

    /// Subscription billed by this invoice.
    pub subscription: Option<Expandable>,

    /// Why the invoice was created (e.g., "subscription_create").
    pub billing_reason: Option<String>,

    pub payment_intent: Option<Expandable>,
}

/// Stripe PaymentIntent object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePaymentIntent {
    /// Payment intent identifier (pi_...).
    pub id: String,

    pub payment_method: Option<Expandable>,
}
