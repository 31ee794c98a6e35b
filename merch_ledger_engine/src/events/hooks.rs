use std::{future::Future, pin::Pin, sync::Arc};

use futures_util::future::join_all;
use log::*;

use crate::events::{
    CacheInvalidationEvent,
    EventHandler,
    EventProducer,
    Handler,
    OrderPaidEvent,
    OrderStatusChangedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub order_status_changed_producer: Vec<EventProducer<OrderStatusChangedEvent>>,
    pub cache_invalidation_producer: Vec<EventProducer<CacheInvalidationEvent>>,
}

impl EventProducers {
    pub async fn publish_order_paid(&self, event: OrderPaidEvent) {
        trace!("📬️ Publishing order paid event for order {}", event.order.id);
        join_all(self.order_paid_producer.iter().map(|p| p.publish_event(event.clone()))).await;
    }

    pub async fn publish_order_status_changed(&self, event: OrderStatusChangedEvent) {
        trace!("📬️ Publishing status change {} -> {} for order {}", event.old_status, event.order.status, event.order.id);
        join_all(self.order_status_changed_producer.iter().map(|p| p.publish_event(event.clone()))).await;
    }

    pub async fn publish_cache_invalidation(&self, event: CacheInvalidationEvent) {
        trace!("📬️ Publishing cache invalidation for {:?}", event.key_strings());
        join_all(self.cache_invalidation_producer.iter().map(|p| p.publish_event(event.clone()))).await;
    }
}

pub struct EventHandlers {
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
    pub on_order_status_changed: Option<EventHandler<OrderStatusChangedEvent>>,
    pub on_cache_invalidation: Option<EventHandler<CacheInvalidationEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_paid = hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f));
        let on_order_status_changed = hooks.on_order_status_changed.map(|f| EventHandler::new(buffer_size, f));
        let on_cache_invalidation = hooks.on_cache_invalidation.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_paid, on_order_status_changed, on_cache_invalidation }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_status_changed {
            result.order_status_changed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_cache_invalidation {
            result.cache_invalidation_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns a task for every registered handler. Each task ends once all of its producers have been dropped.
    pub fn start_handlers(self) -> Vec<tokio::task::JoinHandle<()>> {
        let mut tasks = Vec::new();
        if let Some(handler) = self.on_order_paid {
            tasks.push(tokio::spawn(handler.start_handler()));
        }
        if let Some(handler) = self.on_order_status_changed {
            tasks.push(tokio::spawn(handler.start_handler()));
        }
        if let Some(handler) = self.on_cache_invalidation {
            tasks.push(tokio::spawn(handler.start_handler()));
        }
        tasks
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_order_status_changed: Option<Handler<OrderStatusChangedEvent>>,
    pub on_cache_invalidation: Option<Handler<CacheInvalidationEvent>>,
}

impl EventHooks {
    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_order_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderStatusChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_status_changed = Some(Arc::new(f));
        self
    }

    pub fn on_cache_invalidation<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(CacheInvalidationEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_cache_invalidation = Some(Arc::new(f));
        self
    }
}
