//! Provider payloads and their normalized form

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::exceeds_scale;

use super::{GatewayError, GatewayProvider};

/// A gateway payment independent of the provider that sent it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayPayment {
    pub loan_reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub paid_at: NaiveDateTime,
    pub gateway: String,
    pub gateway_ref: String,
}

/// Mobile money confirmation callback
#[derive(Debug, Deserialize)]
struct MobilePayload {
    #[serde(rename = "TransID")]
    trans_id: String,
    #[serde(rename = "TransAmount")]
    trans_amount: Decimal,
    #[serde(rename = "BillRefNumber")]
    bill_ref_number: String,
    /// `YYYYMMDDHHMMSS`
    #[serde(rename = "TransTime")]
    trans_time: String,
}

/// Bank transfer notification
#[derive(Debug, Deserialize)]
struct BankPayload {
    transaction_id: String,
    amount: Decimal,
    currency: String,
    account_reference: String,
    value_date: NaiveDate,
}

fn required(field: &str, value: String) -> Result<String, GatewayError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(GatewayError::InvalidPayload(format!("{} is empty", field)));
    }
    Ok(value)
}

fn checked_amount(amount: Decimal) -> Result<Decimal, GatewayError> {
    if amount <= Decimal::ZERO || exceeds_scale(amount) {
        return Err(GatewayError::InvalidPayload(format!(
            "invalid amount {}",
            amount
        )));
    }
    Ok(amount)
}

/// Parse a provider payload into a [`GatewayPayment`]
pub fn normalize(
    provider: GatewayProvider,
    body: &[u8],
    mobile_currency: &str,
) -> Result<GatewayPayment, GatewayError> {
    match provider {
        GatewayProvider::Mobile => {
            let payload: MobilePayload = serde_json::from_slice(body)
                .map_err(|e| GatewayError::InvalidPayload(e.to_string()))?;
            let paid_at = NaiveDateTime::parse_from_str(payload.trans_time.trim(), "%Y%m%d%H%M%S")
                .map_err(|_| {
                    GatewayError::InvalidPayload(format!("bad TransTime '{}'", payload.trans_time))
                })?;

            Ok(GatewayPayment {
                loan_reference: required("BillRefNumber", payload.bill_ref_number)?,
                amount: checked_amount(payload.trans_amount)?,
                currency: mobile_currency.to_uppercase(),
                paid_at,
                gateway: provider.as_str().to_string(),
                gateway_ref: required("TransID", payload.trans_id)?,
            })
        }
        GatewayProvider::Bank => {
            let payload: BankPayload = serde_json::from_slice(body)
                .map_err(|e| GatewayError::InvalidPayload(e.to_string()))?;
            let paid_at = payload
                .value_date
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| GatewayError::InvalidPayload("bad value_date".to_string()))?;

            Ok(GatewayPayment {
                loan_reference: required("account_reference", payload.account_reference)?,
                amount: checked_amount(payload.amount)?,
                currency: required("currency", payload.currency)?.to_uppercase(),
                paid_at,
                gateway: provider.as_str().to_string(),
                gateway_ref: required("transaction_id", payload.transaction_id)?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_mobile_payload() {
        let body = br#"{"TransID":"QK12345","TransAmount":"150.00","BillRefNumber":" LN-0001 ","TransTime":"20240402093015"}"#;
        let payment = normalize(GatewayProvider::Mobile, body, "kes").unwrap();
        assert_eq!(payment.loan_reference, "LN-0001");
        assert_eq!(payment.amount, dec!(150.00));
        assert_eq!(payment.currency, "KES");
        assert_eq!(payment.gateway, "mobile");
        assert_eq!(payment.gateway_ref, "QK12345");
        assert_eq!(
            payment.paid_at.date(),
            NaiveDate::from_ymd_opt(2024, 4, 2).unwrap()
        );
    }

    #[test]
    fn test_bank_payload() {
        let body = br#"{"transaction_id":"BT-998","amount":2500.5,"currency":"usd","account_reference":"LN-0002","value_date":"2024-05-01"}"#;
        let payment = normalize(GatewayProvider::Bank, body, "KES").unwrap();
        assert_eq!(payment.amount, dec!(2500.5));
        assert_eq!(payment.currency, "USD");
        assert_eq!(payment.gateway, "bank");
        assert_eq!(payment.gateway_ref, "BT-998");
    }

    #[test]
    fn test_rejects_bad_payloads() {
        let zero = br#"{"TransID":"Q1","TransAmount":"0","BillRefNumber":"LN-1","TransTime":"20240402093015"}"#;
        assert!(matches!(
            normalize(GatewayProvider::Mobile, zero, "KES"),
            Err(GatewayError::InvalidPayload(_))
        ));

        let bad_time = br#"{"TransID":"Q1","TransAmount":"10","BillRefNumber":"LN-1","TransTime":"2024-04-02"}"#;
        assert!(normalize(GatewayProvider::Mobile, bad_time, "KES").is_err());

        let no_ref = br#"{"TransID":"","TransAmount":"10","BillRefNumber":"LN-1","TransTime":"20240402093015"}"#;
        assert!(normalize(GatewayProvider::Mobile, no_ref, "KES").is_err());

        assert!(normalize(GatewayProvider::Bank, b"not json", "KES").is_err());
    }
}
