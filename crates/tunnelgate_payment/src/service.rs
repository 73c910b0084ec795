// --- File: crates/tunnelgate_payment/src/service.rs ---
use tunnelgate_common::services::{BoxFuture, PaymentCreated, PaymentGateway, PaymentInfo, PaymentIntent, Settlement};
use tunnelgate_common::TunnelgateError;

use crate::client::PaymentClient;

impl PaymentGateway for PaymentClient {
    fn create_payment(&self, intent: PaymentIntent) -> BoxFuture<'_, PaymentCreated, TunnelgateError> {
        Box::pin(async move { Ok(PaymentClient::create_payment(self, &intent).await?) })
    }

    fn get_payment_status(&self, payment_id: &str) -> BoxFuture<'_, PaymentInfo, TunnelgateError> {
        let payment_id = payment_id.to_string();
        Box::pin(async move { Ok(PaymentClient::get_payment_status(self, &payment_id).await?) })
    }

    fn parse_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> Result<Settlement, TunnelgateError> {
        Ok(PaymentClient::parse_webhook(self, raw_body, signature)?)
    }
}
