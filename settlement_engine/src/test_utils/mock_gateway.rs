//! An in-memory [`PaymentGateway`] for tests.
//!
//! Ids are handed out sequentially (`pi_mock_1`, `re_mock_1`, ...). Requests carrying an idempotency key that has been
//! seen before return the original result. Individual operations can be scripted to fail. This stateful fake drives
//! the end-to-end flows; tests that only need to script one gateway call use a `mockall` mock instead.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::traits::{
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

/// The only signature [`MockGateway`] accepts.
pub const MOCK_SIGNATURE: &str = "t=0,v1=mock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    CreateIntent,
    CancelIntent,
    Refund,
    ConnectAccount,
    Transfer,
}

#[derive(Debug, Default)]
struct MockState {
    counter: u64,
    intents: HashMap<String, GatewayIntent>,
    refunds: HashMap<String, GatewayRefund>,
    transfers: HashMap<String, GatewayTransfer>,
    failures: HashMap<MockOperation, GatewayError>,
    payouts_enabled: bool,
    calls: Vec<MockOperation>,
    cancelled_intents: Vec<String>,
    transfer_requests: Vec<TransferRequest>,
}

#[derive(Debug, Clone)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        let state = MockState { payouts_enabled: true, ..MockState::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("Mock gateway state is poisoned")
    }

    /// Every subsequent call of `op` fails with `error`.
    pub fn fail(&self, op: MockOperation, error: GatewayError) {
        self.state().failures.insert(op, error);
    }

    /// Whether newly connected accounts report payouts as enabled.
    pub fn set_payouts_enabled(&self, enabled: bool) {
        self.state().payouts_enabled = enabled;
    }

    pub fn call_count(&self, op: MockOperation) -> usize {
        self.state().calls.iter().filter(|c| **c == op).count()
    }

    pub fn cancelled_intents(&self) -> Vec<String> {
        self.state().cancelled_intents.clone()
    }

    pub fn transfer_requests(&self) -> Vec<TransferRequest> {
        self.state().transfer_requests.clone()
    }

    fn begin(&self, op: MockOperation) -> Result<MutexGuard<'_, MockState>, GatewayError> {
        let mut state = self.state();
        state.calls.push(op);
        match state.failures.get(&op) {
            Some(e) => Err(e.clone()),
            None => Ok(state),
        }
    }
}

fn next_id(state: &mut MockState, prefix: &str) -> String {
    state.counter += 1;
    format!("{prefix}_mock_{}", state.counter)
}

impl PaymentGateway for MockGateway {
    async fn create_payment_intent(&self, request: IntentRequest) -> Result<GatewayIntent, GatewayError> {
        let mut state = self.begin(MockOperation::CreateIntent)?;
        if let Some(intent) = state.intents.get(&request.idempotency_key) {
            return Ok(intent.clone());
        }
        let intent_id = next_id(&mut state, "pi");
        let intent = GatewayIntent { client_secret: Some(format!("{intent_id}_secret")), intent_id };
        state.intents.insert(request.idempotency_key, intent.clone());
        Ok(intent)
    }

    async fn cancel_payment_intent(&self, intent_id: &str) -> Result<(), GatewayError> {
        let mut state = self.begin(MockOperation::CancelIntent)?;
        state.cancelled_intents.push(intent_id.to_string());
        Ok(())
    }

    async fn create_refund(&self, request: RefundRequest) -> Result<GatewayRefund, GatewayError> {
        let mut state = self.begin(MockOperation::Refund)?;
        if let Some(refund) = state.refunds.get(&request.idempotency_key) {
            return Ok(refund.clone());
        }
        let refund = GatewayRefund { refund_id: next_id(&mut state, "re"), amount: request.amount };
        state.refunds.insert(request.idempotency_key, refund.clone());
        Ok(refund)
    }

    async fn create_connected_account(
        &self,
        _request: ConnectedAccountRequest,
    ) -> Result<GatewayAccount, GatewayError> {
        let mut state = self.begin(MockOperation::ConnectAccount)?;
        let payouts_enabled = state.payouts_enabled;
        Ok(GatewayAccount { account_id: next_id(&mut state, "acct"), payouts_enabled })
    }

    async fn create_transfer(&self, request: TransferRequest) -> Result<GatewayTransfer, GatewayError> {
        let mut state = self.begin(MockOperation::Transfer)?;
        if let Some(transfer) = state.transfers.get(&request.idempotency_key) {
            return Ok(transfer.clone());
        }
        let transfer = GatewayTransfer { transfer_id: next_id(&mut state, "tr") };
        state.transfers.insert(request.idempotency_key.clone(), transfer.clone());
        state.transfer_requests.push(request);
        Ok(transfer)
    }

    fn verify_webhook_signature(&self, _payload: &[u8], signature: &str) -> Result<(), GatewayError> {
        if signature == MOCK_SIGNATURE {
            Ok(())
        } else {
            Err(GatewayError::InvalidSignature(format!("Unexpected signature '{signature}'")))
        }
    }

    fn parse_event(&self, payload: &[u8]) -> Result<GatewayEvent, GatewayError> {
        serde_json::from_slice(payload).map_err(|e| GatewayError::MalformedEvent(e.to_string()))
    }
}
