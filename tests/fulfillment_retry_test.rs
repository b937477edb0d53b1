//! Retry worker resuming paid orders stuck at a checkpoint

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{order_request, signed_callback, FailAt, Harness, INTENT_ID};
use std::sync::atomic::Ordering;
use std::time::Duration;
use storefront_checkout::database::order_repository::{
    FulfillmentStage, OrderRepository, OrderStatus,
};
use storefront_checkout::workers::{FulfillmentRetryConfig, FulfillmentRetryWorker};
use tokio::sync::watch;

fn worker(h: &Harness, max_attempts: i32) -> FulfillmentRetryWorker {
    FulfillmentRetryWorker::new(
        h.orders.clone(),
        h.engine.clone(),
        FulfillmentRetryConfig {
            interval: Duration::from_millis(50),
            batch_size: 10,
            max_attempts,
        },
    )
}

async fn stalled_order(h: &Harness, step: FailAt) -> uuid::Uuid {
    h.add_brand("Primary", 3).await;
    let created = h
        .checkout
        .create_order("buyer-1", order_request("Primary"))
        .await
        .unwrap();
    h.shipping.fail_at(Some(step));
    h.checkout
        .handle_payment_callback(created.purchaseid, &signed_callback(INTENT_ID, "pay_1"))
        .await
        .unwrap();
    h.shipping.fail_at(None);
    created.purchaseid
}

#[tokio::test]
async fn test_cycle_resumes_from_checkpoint() {
    let h = Harness::new();
    let order_id = stalled_order(&h, FailAt::AssignAwb).await;

    let confirmed = worker(&h, 5).run_cycle().await;
    assert_eq!(confirmed, 1);

    let order = h.orders.find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.fulfillment_stage, FulfillmentStage::Confirmed);
    // the shipment from the first attempt is reused
    assert_eq!(h.shipping.shipments_created.load(Ordering::SeqCst), 1);
    assert_eq!(h.mailer.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cycle_skips_unpaid_orders() {
    let h = Harness::new();
    h.add_brand("Primary", 3).await;
    let created = h
        .checkout
        .create_order("buyer-1", order_request("Primary"))
        .await
        .unwrap();

    assert_eq!(worker(&h, 5).run_cycle().await, 0);
    let order = h.orders.find_by_id(created.purchaseid).await.unwrap().unwrap();
    assert_eq!(order.fulfillment_stage, FulfillmentStage::AwaitingPayment);
    assert_eq!(h.shipping.shipments_created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cycle_stops_after_max_attempts() {
    let h = Harness::new();
    let order_id = stalled_order(&h, FailAt::CreateShipment).await;

    // one attempt already used by the callback
    assert_eq!(worker(&h, 1).run_cycle().await, 0);
    let order = h.orders.find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.fulfillment_attempts, 1);
}

#[tokio::test]
async fn test_failed_retry_records_error_and_keeps_checkpoint() {
    let h = Harness::new();
    let order_id = stalled_order(&h, FailAt::RequestPickup).await;

    h.shipping.fail_at(Some(FailAt::RequestPickup));
    assert_eq!(worker(&h, 5).run_cycle().await, 0);

    let order = h.orders.find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.fulfillment_stage, FulfillmentStage::AwbAssigned);
    assert_eq!(order.fulfillment_attempts, 2);
    assert!(order.last_error.unwrap().contains("Pickup"));
}

#[tokio::test]
async fn test_worker_stops_on_shutdown() {
    let h = Harness::new();
    let order_id = stalled_order(&h, FailAt::CreateShipment).await;

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(worker(&h, 5).run(rx));

    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker did not stop")
        .unwrap();

    let order = h.orders.find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Confirmed);
}

async fn paid_order_with_slow_shipment(h: &Harness, delay: Duration) -> uuid::Uuid {
    h.add_brand("Primary", 3).await;
    let created = h
        .checkout
        .create_order("buyer-1", order_request("Primary"))
        .await
        .unwrap();
    h.shipping.delay_shipments(Some(delay));
    created.purchaseid
}

#[tokio::test]
async fn test_slow_step_keeps_lease_from_worker() {
    let h = Harness::with_lease_secs(1);
    let order_id = paid_order_with_slow_shipment(&h, Duration::from_millis(2500)).await;

    let checkout = h.checkout.clone();
    let callback = tokio::spawn(async move {
        checkout
            .handle_payment_callback(order_id, &signed_callback(INTENT_ID, "pay_1"))
            .await
    });

    // past the original one-second lease while create_shipment is still running
    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert_eq!(worker(&h, 5).run_cycle().await, 0);

    let outcome = callback.await.unwrap().unwrap();
    assert!(outcome.is_success());
    assert_eq!(h.shipping.shipments_created.load(Ordering::SeqCst), 1);

    let order = h.orders.find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.fulfillment_attempts, 1);
    assert!(order.lease_token.is_none());
}

#[tokio::test]
async fn test_run_stops_when_lease_is_taken_over() {
    let h = Harness::with_lease_secs(1);
    let order_id = paid_order_with_slow_shipment(&h, Duration::from_millis(1500)).await;

    let checkout = h.checkout.clone();
    let callback = tokio::spawn(async move {
        checkout
            .handle_payment_callback(order_id, &signed_callback(INTENT_ID, "pay_1"))
            .await
    });

    tokio::time::sleep(Duration::from_millis(400)).await;
    let mut taken = h.orders.find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(taken.fulfillment_stage, FulfillmentStage::PaymentVerified);
    let other_holder = uuid::Uuid::new_v4();
    taken.lease_token = Some(other_holder);
    taken.lease_expires_at = Some(Utc::now() + ChronoDuration::seconds(30));
    h.orders.put(taken).await;

    let err = callback.await.unwrap().unwrap_err();
    assert_eq!(err.status_code(), 409);
    assert_eq!(h.shipping.shipments_created.load(Ordering::SeqCst), 0);

    // the new holder's lease and checkpoint are untouched
    let order = h.orders.find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.lease_token, Some(other_holder));
    assert_eq!(order.fulfillment_stage, FulfillmentStage::PaymentVerified);
    assert!(order.last_error.is_none());
}
