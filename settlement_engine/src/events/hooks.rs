use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderCancelledEvent,
    OrderCreatedEvent,
    OrderPaidEvent,
    PaymentFailedEvent,
    PaymentRefundedEvent,
    PayoutAccruedEvent,
};

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_created_producer: Vec<EventProducer<OrderCreatedEvent>>,
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub order_cancelled_producer: Vec<EventProducer<OrderCancelledEvent>>,
    pub payment_failed_producer: Vec<EventProducer<PaymentFailedEvent>>,
    pub payment_refunded_producer: Vec<EventProducer<PaymentRefundedEvent>>,
    pub payout_accrued_producer: Vec<EventProducer<PayoutAccruedEvent>>,
}

impl EventProducers {
    pub async fn publish_order_created(&self, event: OrderCreatedEvent) {
        for producer in &self.order_created_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_order_paid(&self, event: OrderPaidEvent) {
        for producer in &self.order_paid_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_order_cancelled(&self, event: OrderCancelledEvent) {
        for producer in &self.order_cancelled_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_payment_failed(&self, event: PaymentFailedEvent) {
        for producer in &self.payment_failed_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_payment_refunded(&self, event: PaymentRefundedEvent) {
        for producer in &self.payment_refunded_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_payout_accrued(&self, event: PayoutAccruedEvent) {
        for producer in &self.payout_accrued_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_created: Option<EventHandler<OrderCreatedEvent>>,
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
    pub on_order_cancelled: Option<EventHandler<OrderCancelledEvent>>,
    pub on_payment_failed: Option<EventHandler<PaymentFailedEvent>>,
    pub on_payment_refunded: Option<EventHandler<PaymentRefundedEvent>>,
    pub on_payout_accrued: Option<EventHandler<PayoutAccruedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_order_created: hooks.on_order_created.map(|f| EventHandler::new(buffer_size, f)),
            on_order_paid: hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f)),
            on_order_cancelled: hooks.on_order_cancelled.map(|f| EventHandler::new(buffer_size, f)),
            on_payment_failed: hooks.on_payment_failed.map(|f| EventHandler::new(buffer_size, f)),
            on_payment_refunded: hooks.on_payment_refunded.map(|f| EventHandler::new(buffer_size, f)),
            on_payout_accrued: hooks.on_payout_accrued.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_created {
            result.order_created_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_cancelled {
            result.order_cancelled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_failed {
            result.payment_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_refunded {
            result.payment_refunded_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payout_accrued {
            result.payout_accrued_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_created {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_paid {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_cancelled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_payment_failed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_payment_refunded {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_payout_accrued {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_created: Option<Handler<OrderCreatedEvent>>,
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_order_cancelled: Option<Handler<OrderCancelledEvent>>,
    pub on_payment_failed: Option<Handler<PaymentFailedEvent>>,
    pub on_payment_refunded: Option<Handler<PaymentRefundedEvent>>,
    pub on_payout_accrued: Option<Handler<PayoutAccruedEvent>>,
}

impl EventHooks {
    pub fn on_order_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCreatedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_created = Some(Arc::new(f));
        self
    }

    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_order_cancelled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCancelledEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_cancelled = Some(Arc::new(f));
        self
    }

    pub fn on_payment_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentFailedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_payment_failed = Some(Arc::new(f));
        self
    }

    pub fn on_payment_refunded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentRefundedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_payment_refunded = Some(Arc::new(f));
        self
    }

    pub fn on_payout_accrued<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PayoutAccruedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_payout_accrued = Some(Arc::new(f));
        self
    }
}
