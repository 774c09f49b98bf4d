use cucumber::given;

use crate::cucumber::{world::SettlementSystem, SettlementWorld};

#[given(expr = "a fresh marketplace with {int} of each product in stock")]
async fn fresh_marketplace(world: &mut SettlementWorld, stock: i64) {
    let system = SettlementSystem::new(stock).await;
    world.system = Some(system);
}

#[given("the gateway refuses transfers")]
async fn gateway_refuses_transfers(world: &mut SettlementWorld) {
    use settlement_engine::{test_utils::MockOperation, traits::GatewayError};
    world.system().gateway.fail(MockOperation::Transfer, GatewayError::Rejected("account restricted".into()));
}
