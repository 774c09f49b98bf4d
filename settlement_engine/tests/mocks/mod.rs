use mockall::mock;
use settlement_engine::traits::{
    ConnectedAccountRequest,
    GatewayAccount,
    GatewayError,
    GatewayEvent,
    GatewayIntent,
    GatewayRefund,
    GatewayTransfer,
    IntentRequest,
    PaymentGateway,
    RefundRequest,
    TransferRequest,
};

mock! {
    pub PaymentProvider {}
    impl Clone for PaymentProvider {
        fn clone(&self) -> Self;
    }
    impl PaymentGateway for PaymentProvider {
        async fn create_payment_intent(&self, request: IntentRequest) -> Result<GatewayIntent, GatewayError>;
        async fn cancel_payment_intent(&self, intent_id: &str) -> Result<(), GatewayError>;
        async fn create_refund(&self, request: RefundRequest) -> Result<GatewayRefund, GatewayError>;
        async fn create_connected_account(&self, request: ConnectedAccountRequest) -> Result<GatewayAccount, GatewayError>;
        async fn create_transfer(&self, request: TransferRequest) -> Result<GatewayTransfer, GatewayError>;
        fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<(), GatewayError>;
        fn parse_event(&self, payload: &[u8]) -> Result<GatewayEvent, GatewayError>;
    }
}

pub fn intent(intent_id: &str) -> GatewayIntent {
    GatewayIntent { intent_id: intent_id.to_string(), client_secret: Some(format!("{intent_id}_secret")) }
}
