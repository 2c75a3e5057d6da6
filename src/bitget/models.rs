//! Bitget API data models
//!
//! Request and response types for the Bitget mix (USDT-M futures) endpoints.

use serde::{Deserialize, Serialize};

/// Success code returned by the Bitget API
pub const SUCCESS_CODE: &str = "00000";

/// Envelope every Bitget response arrives in
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub code: String,
    pub msg: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

/// Request body for placing a mix order
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub margin_coin: String,
    /// Base currency amount, stringly typed as the API requires
    pub size: String,
    /// "open_long" or "close_long"
    pub side: String,
    pub order_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_oid: Option<String>,
}

/// Order identifiers returned on placement
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    pub order_id: String,
    #[serde(default)]
    pub client_oid: Option<String>,
}

/// Request body for setting leverage
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLeverageRequest {
    pub symbol: String,
    pub margin_coin: String,
    pub leverage: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_envelope_parses_success_and_error() {
        let ok: ApiResponse<OrderData> = serde_json::from_str(
            r#"{"code":"00000","msg":"success","data":{"orderId":"123","clientOid":"abc"}}"#,
        )
        .unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.data.unwrap().order_id, "123");

        let err: ApiResponse<OrderData> =
            serde_json::from_str(r#"{"code":"40009","msg":"sign error","data":null}"#).unwrap();
        assert!(!err.is_success());
        assert!(err.data.is_none());
    }

    #[test]
    fn order_request_serializes_camel_case() {
        let request = PlaceOrderRequest {
            symbol: "BTCUSDT_UMCBL".to_string(),
            margin_coin: "USDT".to_string(),
            size: "0.01".to_string(),
            side: "close_long".to_string(),
            order_type: "market".to_string(),
            client_oid: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"marginCoin\":\"USDT\""));
        assert!(json.contains("\"orderType\":\"market\""));
        assert!(!json.contains("clientOid"));
    }
}
