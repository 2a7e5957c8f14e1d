//! eSewa payment gateway adapter.
//!
//! Builds the signed form the storefront posts to the hosted payment page and
//! verifies the signed payload the gateway sends back on redirect.

mod callback;
mod signature;

pub use callback::{CallbackQuery, VerificationFailure, VerifiedPayment, COMPLETE_STATUS};
pub use signature::{signing_string, SignatureGenerator, OUTBOUND_SIGNED_FIELDS};

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::entities::order;
use crate::money::format_currency;

/// Immutable gateway settings, built once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub product_code: String,
    pub secret_key: String,
    pub form_url: String,
    /// Public base URL of this service, without a trailing slash
    pub base_url: String,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("product_code", &self.product_code)
            .field("secret_key", &"<redacted>")
            .field("form_url", &self.form_url)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Form fields posted to the gateway. Amounts carry exactly two decimals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaymentFormData {
    #[schema(example = "119.98")]
    pub amount: String,
    #[schema(example = "5.00")]
    pub tax_amount: String,
    #[schema(example = "129.98")]
    pub total_amount: String,
    pub transaction_uuid: String,
    #[schema(example = "EPAYTEST")]
    pub product_code: String,
    #[schema(example = "2.00")]
    pub product_service_charge: String,
    #[schema(example = "3.00")]
    pub product_delivery_charge: String,
    pub success_url: String,
    pub failure_url: String,
    #[schema(example = "total_amount,transaction_uuid,product_code")]
    pub signed_field_names: String,
    pub signature: String,
}

/// Everything the client needs to submit the hosted payment form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub form_data: PaymentFormData,
    pub gateway_url: String,
}

#[derive(Clone)]
pub struct PaymentAdapter {
    config: GatewayConfig,
    signer: SignatureGenerator,
}

impl fmt::Debug for PaymentAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentAdapter")
            .field("config", &self.config)
            .finish()
    }
}

impl PaymentAdapter {
    pub fn new(config: GatewayConfig) -> Self {
        let signer = SignatureGenerator::new(config.secret_key.clone());
        Self { config, signer }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Signs `message` with the merchant secret.
    pub fn sign(&self, message: &str) -> String {
        self.signer.sign(message)
    }

    pub fn success_url(&self) -> String {
        format!("{}/esewa-callback", self.config.base_url)
    }

    pub fn failure_url(&self) -> String {
        format!("{}/esewa-callback?status=fail", self.config.base_url)
    }

    /// Builds the signed form for `order`. Deterministic for an unchanged order.
    pub fn build_outbound_request(&self, order: &order::Model) -> PaymentRequest {
        let total_amount = format_currency(order.total_amount);
        let signature = self.signer.sign_fields(&[
            ("total_amount", total_amount.as_str()),
            ("transaction_uuid", order.transaction_uuid.as_str()),
            ("product_code", self.config.product_code.as_str()),
        ]);

        PaymentRequest {
            form_data: PaymentFormData {
                amount: format_currency(order.amount),
                tax_amount: format_currency(order.tax_amount),
                total_amount,
                transaction_uuid: order.transaction_uuid.clone(),
                product_code: self.config.product_code.clone(),
                product_service_charge: format_currency(order.service_charge),
                product_delivery_charge: format_currency(order.delivery_charge),
                success_url: self.success_url(),
                failure_url: self.failure_url(),
                signed_field_names: OUTBOUND_SIGNED_FIELDS.to_string(),
                signature,
            },
            gateway_url: self.config.form_url.clone(),
        }
    }

    /// Verifies the redirect payload. Performs no side effects.
    pub fn verify_callback(
        &self,
        query: &CallbackQuery,
    ) -> Result<VerifiedPayment, VerificationFailure> {
        callback::verify(&self.signer, &self.config.product_code, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::OrderStatus;
    use assert_matches::assert_matches;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use chrono::Utc;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn adapter(secret: &str) -> PaymentAdapter {
        PaymentAdapter::new(GatewayConfig {
            product_code: "EPAYTEST".into(),
            secret_key: secret.into(),
            form_url: "https://rc-epay.esewa.com.np/api/epay/main/v2/form".into(),
            base_url: "http://localhost:8000".into(),
        })
    }

    fn order(transaction_uuid: &str) -> order::Model {
        let now = Utc::now();
        order::Model {
            id: 1,
            transaction_uuid: transaction_uuid.into(),
            customer_name: "Asha".into(),
            customer_email: Some("asha@example.com".into()),
            customer_phone: None,
            customer_address: None,
            amount: dec!(119.98),
            tax_amount: dec!(5),
            service_charge: dec!(2),
            delivery_charge: dec!(3),
            total_amount: dec!(129.98),
            status: OrderStatus::Initiated,
            created_at: now,
            updated_at: now,
        }
    }

    fn signed_data(adapter: &PaymentAdapter, status: &str, total_amount: &str) -> String {
        let message = format!(
            "transaction_code=000AE01,status={status},total_amount={total_amount},transaction_uuid=abc,product_code=EPAYTEST,signed_field_names=transaction_code,status,total_amount,transaction_uuid,product_code,signed_field_names"
        );
        let payload = json!({
            "transaction_code": "000AE01",
            "status": status,
            "total_amount": total_amount,
            "transaction_uuid": "abc",
            "product_code": "EPAYTEST",
            "signed_field_names": "transaction_code,status,total_amount,transaction_uuid,product_code,signed_field_names",
            "signature": adapter.sign(&message),
        });
        STANDARD.encode(payload.to_string())
    }

    fn query(data: Option<String>) -> CallbackQuery {
        CallbackQuery { status: None, data }
    }

    #[test]
    fn outbound_request_matches_known_signature() {
        let request = adapter("S").build_outbound_request(&order("abc"));
        assert_eq!(
            request.form_data.signature,
            "nnd+k2mchRQsVyIhQYtmIOb52Uhbl1lNN+5EiJqW1gc="
        );
        assert_eq!(request.form_data.total_amount, "129.98");
        assert_eq!(request.form_data.tax_amount, "5.00");
        assert_eq!(request.form_data.product_service_charge, "2.00");
        assert_eq!(request.form_data.product_delivery_charge, "3.00");
        assert_eq!(request.form_data.signed_field_names, OUTBOUND_SIGNED_FIELDS);
        assert_eq!(
            request.form_data.success_url,
            "http://localhost:8000/esewa-callback"
        );
        assert_eq!(
            request.form_data.failure_url,
            "http://localhost:8000/esewa-callback?status=fail"
        );
        assert_eq!(
            request.gateway_url,
            "https://rc-epay.esewa.com.np/api/epay/main/v2/form"
        );
    }

    #[test]
    fn outbound_request_is_deterministic() {
        let adapter = adapter("8gBm/:&EnhH.1/q");
        let order = order("abc");
        let first = adapter.build_outbound_request(&order);
        let second = adapter.build_outbound_request(&order);
        assert_eq!(first, second);
        assert_eq!(
            first.form_data.signature,
            "dlVOZxces/2K+sMkgT1YGwSNDYK3BaO1Xd5uYCnHbGM="
        );
    }

    #[test]
    fn payment_request_serializes_in_camel_case() {
        let value = serde_json::to_value(adapter("S").build_outbound_request(&order("abc"))).unwrap();
        assert!(value.get("formData").is_some());
        assert!(value.get("gatewayUrl").is_some());
        assert_eq!(value["formData"]["transaction_uuid"], "abc");
    }

    #[test]
    fn debug_output_redacts_secret() {
        let rendered = format!("{:?}", adapter("super-secret-key"));
        assert!(!rendered.contains("super-secret-key"));
    }

    #[test]
    fn verifies_complete_payment() {
        let adapter = adapter("8gBm/:&EnhH.1/q");
        let verified = adapter
            .verify_callback(&query(Some(signed_data(&adapter, "COMPLETE", "129.98"))))
            .expect("signed COMPLETE payload verifies");
        assert_eq!(
            verified,
            VerifiedPayment {
                transaction_code: "000AE01".into(),
                transaction_uuid: "abc".into(),
                total_amount: "129.98".into(),
            }
        );
    }

    #[test]
    fn restores_plus_signs_turned_into_spaces() {
        let adapter = adapter("8gBm/:&EnhH.1/q");
        let data = signed_data(&adapter, "COMPLETE", "129.98").replace('+', " ");
        assert!(adapter.verify_callback(&query(Some(data))).is_ok());
    }

    #[test]
    fn numeric_amounts_are_signed_in_json_form() {
        let adapter = adapter("8gBm/:&EnhH.1/q");
        let message = "transaction_code=X1,status=COMPLETE,total_amount=100.0,transaction_uuid=abc,product_code=EPAYTEST,signed_field_names=transaction_code,status,total_amount,transaction_uuid,product_code,signed_field_names";
        let payload = json!({
            "transaction_code": "X1",
            "status": "COMPLETE",
            "total_amount": 100.0,
            "transaction_uuid": "abc",
            "signed_field_names": "transaction_code,status,total_amount,transaction_uuid,product_code,signed_field_names",
            "signature": adapter.sign(message),
        });
        let verified = adapter
            .verify_callback(&query(Some(STANDARD.encode(payload.to_string()))))
            .unwrap();
        assert_eq!(verified.total_amount, "100.0");
    }

    #[test]
    fn explicit_failure_skips_verification() {
        let adapter = adapter("8gBm/:&EnhH.1/q");
        let q = CallbackQuery {
            status: Some("fail".into()),
            data: Some(signed_data(&adapter, "COMPLETE", "129.98")),
        };
        assert_eq!(
            adapter.verify_callback(&q),
            Err(VerificationFailure::GatewayReportedFailure)
        );
    }

    #[rstest]
    #[case::absent(None)]
    #[case::empty(Some(String::new()))]
    #[case::blank(Some("   ".to_string()))]
    fn missing_payload_is_rejected(#[case] data: Option<String>) {
        assert_eq!(
            adapter("S").verify_callback(&query(data)),
            Err(VerificationFailure::MissingPayload)
        );
    }

    #[rstest]
    #[case::not_base64("%%%not-base64%%%".to_string())]
    #[case::not_json(STANDARD.encode("hello"))]
    #[case::not_object(STANDARD.encode("[1,2,3]"))]
    #[case::missing_fields(STANDARD.encode(r#"{"status":"COMPLETE"}"#))]
    #[case::nested_field(STANDARD.encode(r#"{"transaction_code":{},"status":"COMPLETE"}"#))]
    fn undecodable_payload_is_rejected(#[case] data: String) {
        assert_matches!(
            adapter("S").verify_callback(&query(Some(data))),
            Err(VerificationFailure::Decode(_))
        );
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let adapter = adapter("8gBm/:&EnhH.1/q");
        let payload = json!({
            "transaction_code": "000AE01",
            "status": "COMPLETE",
            "total_amount": "129.98",
            "transaction_uuid": "abc",
            "signed_field_names": "transaction_code,status,total_amount,transaction_uuid,product_code,signed_field_names",
            "signature": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=",
        });
        assert_eq!(
            adapter.verify_callback(&query(Some(STANDARD.encode(payload.to_string())))),
            Err(VerificationFailure::SignatureMismatch)
        );
    }

    #[test]
    fn payload_signed_with_other_secret_is_rejected() {
        let forger = adapter("not-the-merchant-secret");
        let data = signed_data(&forger, "COMPLETE", "129.98");
        assert_eq!(
            adapter("8gBm/:&EnhH.1/q").verify_callback(&query(Some(data))),
            Err(VerificationFailure::SignatureMismatch)
        );
    }

    #[test]
    fn non_complete_status_is_rejected_after_signature_check() {
        let adapter = adapter("8gBm/:&EnhH.1/q");
        let data = signed_data(&adapter, "PENDING", "129.98");
        assert_eq!(
            adapter.verify_callback(&query(Some(data))),
            Err(VerificationFailure::StatusNotComplete("PENDING".into()))
        );
    }

    #[test]
    fn failure_reasons_are_stable_labels() {
        assert_eq!(
            VerificationFailure::SignatureMismatch.reason(),
            "signature_mismatch"
        );
        assert_eq!(
            VerificationFailure::Decode("x".into()).reason(),
            "decode_error"
        );
    }
}
