//! The gateway's wire protocol (§6): transaction-type codes, the request
//! envelope, response parsing, and MAC computation.
//!
//! The exact HMAC field order for each transaction type is a contract
//! boundary, not something derived dynamically (§9 Open Question): each
//! [`TranCode`] names its own `mac_field_order()` so a future drift in the
//! upstream gateway's spec is a one-line change here, not a guessing game.

use pay_common::{Money, PayError};
use serde::{Deserialize, Serialize};

/// Transaction-type code sent in `TRAN_CODE`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TranCode {
    CardSale,
    CardAuth,
    CardCapture,
    CardVoid,
    CardRefund,
    /// Convert a financial BRIC into a long-lived storage token (§4.5).
    CardStorageConversion,
    AchDebit,
    /// Zero-amount verification submission (§4.6).
    AchPrenote,
    AchStorageConversion,
}

impl TranCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CardSale => "CCE1",
            Self::CardAuth => "CCE2",
            Self::CardCapture => "CCE3",
            Self::CardVoid => "CCE5",
            Self::CardRefund => "CCE6",
            Self::CardStorageConversion => "CCE8",
            Self::AchDebit => "CKC1",
            Self::AchPrenote => "CKC6",
            Self::AchStorageConversion => "CKC8",
        }
    }

    /// The ordered list of envelope fields concatenated to compute the MAC
    /// for this transaction type. `TRAN_NBR` and the acquirer identifiers
    /// anchor every type; capture/void/refund additionally bind the parent's
    /// `TRAN_NBR` so a MAC can't be replayed against a different parent.
    fn mac_field_order(self) -> &'static [MacField] {
        use MacField::*;
        match self {
            Self::CardSale | Self::CardAuth | Self::AchDebit | Self::AchPrenote => {
                &[CustNbr, MerchNbr, DbaNbr, TerminalNbr, TranCode, TranNbr, Amount]
            }
            Self::CardCapture | Self::CardVoid | Self::CardRefund => &[
                CustNbr,
                MerchNbr,
                DbaNbr,
                TerminalNbr,
                TranCode,
                TranNbr,
                Amount,
                ParentTranNbr,
            ],
            Self::CardStorageConversion | Self::AchStorageConversion => {
                &[CustNbr, MerchNbr, DbaNbr, TerminalNbr, TranCode, TranNbr, Bric]
            }
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum MacField {
    CustNbr,
    MerchNbr,
    DbaNbr,
    TerminalNbr,
    TranCode,
    TranNbr,
    Amount,
    ParentTranNbr,
    Bric,
}

/// A server-post request envelope (§6). `bric` carries either a financial
/// token from a prior transaction or a storage token, depending on
/// `tran_code`; the wire protocol never carries raw card/account data.
#[derive(Clone, Debug)]
pub struct RequestEnvelope {
    pub cust_nbr: String,
    pub merch_nbr: String,
    pub dba_nbr: String,
    pub terminal_nbr: String,
    pub tran_code: TranCode,
    pub tran_nbr: String,
    pub amount: Money,
    pub bric: Option<String>,
    pub parent_tran_nbr: Option<String>,
    pub redirect_url: Option<String>,
    pub user_data: [Option<String>; 3],
}

impl RequestEnvelope {
    fn mac_input(&self) -> Result<String, PayError> {
        let mut parts = Vec::new();
        for field in self.tran_code.mac_field_order() {
            let value = match field {
                MacField::CustNbr => self.cust_nbr.clone(),
                MacField::MerchNbr => self.merch_nbr.clone(),
                MacField::DbaNbr => self.dba_nbr.clone(),
                MacField::TerminalNbr => self.terminal_nbr.clone(),
                MacField::TranCode => self.tran_code.as_str().to_string(),
                MacField::TranNbr => self.tran_nbr.clone(),
                MacField::Amount => self.amount.to_decimal_string(),
                MacField::ParentTranNbr => self.parent_tran_nbr.clone().ok_or_else(|| {
                    PayError::invalid_input("parent_tran_nbr required for this transaction type")
                })?,
                MacField::Bric => self.bric.clone().ok_or_else(|| {
                    PayError::invalid_input("bric required for this transaction type")
                })?,
            };
            parts.push(value);
        }
        Ok(parts.join("|"))
    }

    /// Compute the hex-encoded HMAC-SHA256 MAC over this envelope's
    /// contract-ordered fields, using the tenant's MAC secret.
    pub fn compute_mac(&self, mac_secret: &str) -> Result<String, PayError> {
        let input = self.mac_input()?;
        let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, mac_secret.as_bytes());
        let tag = ring::hmac::sign(&key, input.as_bytes());
        Ok(hex_encode(tag.as_ref()))
    }

    /// Serialize to the server-post form-encoded body, with `mac` supplied
    /// by the caller once computed. Server-posts authenticate with the MAC
    /// alone; a `TAC` is only used on the browser-post redirect path (see
    /// [`GatewayAdapter::exchange_key_for_tac`]).
    pub fn to_form(&self, mac: &str) -> Result<String, PayError> {
        let mut fields: Vec<(&str, String)> = vec![
            ("CUST_NBR", self.cust_nbr.clone()),
            ("MERCH_NBR", self.merch_nbr.clone()),
            ("DBA_NBR", self.dba_nbr.clone()),
            ("TERMINAL_NBR", self.terminal_nbr.clone()),
            ("TRAN_NBR", self.tran_nbr.clone()),
            ("TRAN_CODE", self.tran_code.as_str().to_string()),
            ("AMOUNT", self.amount.to_decimal_string()),
            ("INDUSTRY_TYPE", "E".to_string()),
            ("MAC", mac.to_string()),
        ];
        if let Some(bric) = &self.bric {
            fields.push(("BRIC", bric.clone()));
        }
        if let Some(parent) = &self.parent_tran_nbr {
            fields.push(("PARENT_TRAN_NBR", parent.clone()));
        }
        if let Some(url) = &self.redirect_url {
            fields.push(("REDIRECT_URL", url.clone()));
        }
        for (i, data) in self.user_data.iter().enumerate() {
            if let Some(value) = data {
                fields.push((USER_DATA_KEYS[i], value.clone()));
            }
        }
        serde_urlencoded::to_string(&fields)
            .map_err(|e| PayError::internal(format!("form encode: {e}")))
    }
}

const USER_DATA_KEYS: [&str; 3] = ["USER_DATA_1", "USER_DATA_2", "USER_DATA_3"];

/// The gateway's form-encoded response (§6). `is_approved()` is the only
/// rule: `AUTH_RESP == "00"`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayResponse {
    #[serde(rename = "AUTH_RESP")]
    pub auth_resp: String,
    #[serde(rename = "AUTH_GUID")]
    pub auth_guid: Option<String>,
    #[serde(rename = "AUTH_CODE")]
    pub auth_code: Option<String>,
    #[serde(rename = "AUTH_CARD_TYPE")]
    pub auth_card_type: Option<String>,
    #[serde(rename = "AUTH_RESP_TEXT")]
    pub auth_resp_text: Option<String>,
    #[serde(rename = "TRAN_NBR")]
    pub tran_nbr: String,
}

impl GatewayResponse {
    pub fn is_approved(&self) -> bool {
        self.auth_resp == "00"
    }

    pub fn parse_form(body: &str) -> Result<Self, PayError> {
        serde_urlencoded::from_str(body)
            .map_err(|e| PayError::MalformedGatewayResponse(e.to_string()))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_envelope(tran_code: TranCode) -> RequestEnvelope {
        RequestEnvelope {
            cust_nbr: "100".to_string(),
            merch_nbr: "200".to_string(),
            dba_nbr: "300".to_string(),
            terminal_nbr: "400".to_string(),
            tran_code,
            tran_nbr: "0000000001".to_string(),
            amount: Money::from_minor_units(1000).unwrap(),
            bric: Some("BRIC-X".to_string()),
            parent_tran_nbr: Some("0000000000".to_string()),
            redirect_url: None,
            user_data: [None, None, None],
        }
    }

    #[test]
    fn mac_is_deterministic() {
        let envelope = sample_envelope(TranCode::CardSale);
        let a = envelope.compute_mac("secret").unwrap();
        let b = envelope.compute_mac("secret").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn mac_differs_by_secret() {
        let envelope = sample_envelope(TranCode::CardSale);
        let a = envelope.compute_mac("secret-1").unwrap();
        let b = envelope.compute_mac("secret-2").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn capture_requires_parent_tran_nbr() {
        let mut envelope = sample_envelope(TranCode::CardCapture);
        envelope.parent_tran_nbr = None;
        assert!(envelope.compute_mac("secret").is_err());
    }

    #[test]
    fn storage_conversion_requires_bric() {
        let mut envelope = sample_envelope(TranCode::CardStorageConversion);
        envelope.bric = None;
        assert!(envelope.compute_mac("secret").is_err());
    }

    #[test]
    fn response_parses_approved() {
        let body = "AUTH_RESP=00&AUTH_GUID=g1&AUTH_CODE=c1&AUTH_CARD_TYPE=VISA&\
                     AUTH_RESP_TEXT=APPROVED&TRAN_NBR=0000000001";
        let resp = GatewayResponse::parse_form(body).unwrap();
        assert!(resp.is_approved());
        assert_eq!(resp.tran_nbr, "0000000001");
    }

    #[test]
    fn response_parses_declined() {
        let body = "AUTH_RESP=05&TRAN_NBR=0000000001";
        let resp = GatewayResponse::parse_form(body).unwrap();
        assert!(!resp.is_approved());
    }

    #[test]
    fn malformed_response_is_rejected() {
        let err = GatewayResponse::parse_form("not a form body at all \0").unwrap_err();
        assert!(matches!(err, PayError::MalformedGatewayResponse(_)));
    }
}
