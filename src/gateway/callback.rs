use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use utoipa::IntoParams;

use super::signature::{signing_string, SignatureGenerator};

/// Status value the gateway reports for a settled payment.
pub const COMPLETE_STATUS: &str = "COMPLETE";

/// Query string of the gateway redirect back to `/esewa-callback`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    /// `fail` when the gateway sends the customer to the failure URL
    pub status: Option<String>,
    /// Base64-encoded signed JSON payload
    pub data: Option<String>,
}

/// Facts extracted from a callback whose signature verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedPayment {
    pub transaction_code: String,
    pub transaction_uuid: String,
    pub total_amount: String,
}

/// Why a callback was rejected. Never shown to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationFailure {
    #[error("gateway reported failure")]
    GatewayReportedFailure,
    #[error("callback payload missing")]
    MissingPayload,
    #[error("callback payload could not be decoded: {0}")]
    Decode(String),
    #[error("callback signature mismatch")]
    SignatureMismatch,
    #[error("payment status is {0}, not COMPLETE")]
    StatusNotComplete(String),
}

impl VerificationFailure {
    /// Stable label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::GatewayReportedFailure => "gateway_reported_failure",
            Self::MissingPayload => "missing_payload",
            Self::Decode(_) => "decode_error",
            Self::SignatureMismatch => "signature_mismatch",
            Self::StatusNotComplete(_) => "status_not_complete",
        }
    }
}

/// Decoded callback payload keyed by field name.
struct CallbackPayload(Map<String, Value>);

impl CallbackPayload {
    fn decode(data: &str) -> Result<Self, VerificationFailure> {
        // Form decoding turns '+' into ' '.
        let normalized = data.trim().replace(' ', "+");
        let bytes = STANDARD
            .decode(normalized.as_bytes())
            .map_err(|e| VerificationFailure::Decode(format!("invalid base64: {}", e)))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| VerificationFailure::Decode(format!("invalid utf-8: {}", e)))?;
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(_) => Err(VerificationFailure::Decode(
                "payload is not a JSON object".to_string(),
            )),
            Err(e) => Err(VerificationFailure::Decode(format!("invalid json: {}", e))),
        }
    }

    /// Field rendered the way it was signed: strings verbatim, numbers and
    /// booleans in their JSON text form.
    fn field(&self, name: &str) -> Result<String, VerificationFailure> {
        match self.0.get(name) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::Bool(b)) => Ok(b.to_string()),
            Some(_) => Err(VerificationFailure::Decode(format!(
                "field {} is not a scalar",
                name
            ))),
            None => Err(VerificationFailure::Decode(format!(
                "missing field {}",
                name
            ))),
        }
    }
}

pub(super) fn verify(
    signer: &SignatureGenerator,
    product_code: &str,
    query: &CallbackQuery,
) -> Result<VerifiedPayment, VerificationFailure> {
    if query.status.as_deref() == Some("fail") {
        return Err(VerificationFailure::GatewayReportedFailure);
    }

    let data = query
        .data
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .ok_or(VerificationFailure::MissingPayload)?;

    let payload = CallbackPayload::decode(data)?;
    let transaction_code = payload.field("transaction_code")?;
    let status = payload.field("status")?;
    let total_amount = payload.field("total_amount")?;
    let transaction_uuid = payload.field("transaction_uuid")?;
    let signed_field_names = payload.field("signed_field_names")?;
    let received_signature = payload.field("signature")?;

    let message = signing_string(&[
        ("transaction_code", transaction_code.as_str()),
        ("status", status.as_str()),
        ("total_amount", total_amount.as_str()),
        ("transaction_uuid", transaction_uuid.as_str()),
        ("product_code", product_code),
        ("signed_field_names", signed_field_names.as_str()),
    ]);

    if !signer.verify(&message, &received_signature) {
        return Err(VerificationFailure::SignatureMismatch);
    }

    if status != COMPLETE_STATUS {
        return Err(VerificationFailure::StatusNotComplete(status));
    }

    Ok(VerifiedPayment {
        transaction_code,
        transaction_uuid,
        total_amount,
    })
}
