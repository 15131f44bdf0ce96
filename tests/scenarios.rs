//! End-to-end storefront flows over the in-memory backends.

use std::sync::Arc;

use amilax_commerce::cart_store::{stored_count, CartStorage, CartStore, MemoryStorage, CART_DATA_KEY};
use amilax_commerce::domain::{CartProduct, CustomerKey, LoyaltyTier, OrderStatus, TrackingStatus};
use amilax_commerce::services::{
    AccountService, AdminConsole, BuyerForm, CheckoutError, CheckoutOrchestrator, CustomerReconciler, PaymentMethod,
    ReconcileStrategy, ValidationError,
};
use amilax_commerce::store::{MemoryRecordStore, OrderFilter, RecordStore};
use rust_decimal::Decimal;
use uuid::Uuid;

struct Shop {
    store: Arc<MemoryRecordStore>,
    checkout: CheckoutOrchestrator,
    admin: AdminConsole,
}

fn shop() -> Shop {
    let store = Arc::new(MemoryRecordStore::new());
    let reconciler = CustomerReconciler::new(store.clone(), ReconcileStrategy::FullHistory);
    Shop {
        checkout: CheckoutOrchestrator::new(store.clone(), reconciler.clone()),
        admin: AdminConsole::new(store.clone(), reconciler),
        store,
    }
}

fn product(id: &str, name: &str, price: i64) -> CartProduct {
    CartProduct { id: id.into(), name: name.into(), unit_price: Decimal::new(price, 0) }
}

fn buyer(phone: &str, address: &str) -> BuyerForm {
    BuyerForm {
        full_name: "Mary Atieno".into(),
        phone: phone.into(),
        delivery_address: address.into(),
        email: Some("mary@example.com".into()),
        notes: None,
    }
}

fn cart_with(items: &[(CartProduct, i32)]) -> CartStore<MemoryStorage> {
    let mut cart = CartStore::open(MemoryStorage::new());
    for (p, qty) in items { cart.add(p, *qty).unwrap(); }
    cart
}

async fn buy(shop: &Shop, phone: &str, price: i64, user_id: Option<Uuid>) -> amilax_commerce::services::OrderConfirmation {
    let mut cart = cart_with(&[(product("item", "Item", price), 1)]);
    let pending = shop.checkout.prepare(&cart, &buyer(phone, "Parklands"), PaymentMethod::Mpesa, user_id).unwrap();
    shop.checkout.place(pending, &mut cart).await.unwrap()
}

#[tokio::test]
async fn scenario_a_checkout_total_and_cleared_cart() {
    let shop = shop();
    let mut cart = cart_with(&[(product("vit-c", "Vitamin C", 1200), 2), (product("vit-d3", "Vitamin D3", 850), 1)]);
    assert_eq!(cart.total().amount(), Decimal::new(3250, 0));

    let pending = shop.checkout.prepare(&cart, &buyer("0700111222", "Westlands"), PaymentMethod::Mpesa, None).unwrap();
    let confirmation = shop.checkout.place(pending, &mut cart).await.unwrap();

    assert_eq!(confirmation.order.total_amount, Decimal::new(3250, 0));
    assert_eq!(confirmation.order.status, OrderStatus::Pending);
    assert_eq!(confirmation.order.tracking_status, TrackingStatus::Processing);
    assert_eq!(confirmation.items.len(), 2);
    assert_eq!(cart.count(), 0);
    assert_eq!(stored_count(cart.storage()), 0);
    assert_eq!(shop.store.order_items(confirmation.order.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn scenario_b_new_phone_customer() {
    let shop = shop();
    let confirmation = buy(&shop, "0700111222", 10_000, None).await;
    let customer = confirmation.customer.unwrap();
    assert_eq!(customer.total_spent, Decimal::new(10_000, 0));
    assert_eq!(customer.loyalty_points, 100);
    assert_eq!(customer.tier(), LoyaltyTier::Bronze);
}

#[tokio::test]
async fn scenario_c_repeat_customer_reaches_gold() {
    let shop = shop();
    let first = buy(&shop, "0700111222", 45_000, None).await.customer.unwrap();
    assert_eq!(first.loyalty_points, 450);
    assert_eq!(first.tier(), LoyaltyTier::Silver);

    let second = buy(&shop, "0700111222", 10_000, None).await.customer.unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.total_spent, Decimal::new(55_000, 0));
    assert_eq!(second.loyalty_points, 550);
    assert_eq!(second.tier(), LoyaltyTier::Gold);
}

#[tokio::test]
async fn scenario_d_missing_address_touches_nothing() {
    let shop = shop();
    let cart = cart_with(&[(product("vit-c", "Vitamin C", 1200), 2)]);
    let before = cart.snapshot();

    let err = shop.checkout.prepare(&cart, &buyer("0700111222", "   "), PaymentMethod::Mpesa, None).unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(ValidationError::MissingAddress)));
    assert_eq!(shop.store.write_count(), 0);
    assert_eq!(cart.snapshot(), before);
}

#[tokio::test]
async fn scenario_e_delivered_status_forces_tracking() {
    let shop = shop();
    let order = buy(&shop, "0700111222", 500, None).await.order;
    shop.admin.set_tracking(order.id, TrackingStatus::Packed).await.unwrap();
    shop.admin.update_status(order.id, OrderStatus::Delivered).await.unwrap();

    let stored = shop.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Delivered);
    assert_eq!(stored.tracking_status, TrackingStatus::Delivered);

    // The reverse does not hold.
    let moved = shop.admin.set_tracking(order.id, TrackingStatus::Packed).await.unwrap();
    assert_eq!(moved.status, OrderStatus::Delivered);
}

#[tokio::test]
async fn repeated_reconciliation_is_idempotent() {
    let shop = shop();
    let order = buy(&shop, "0711222333", 7_450, None).await.order;
    let reconciler = CustomerReconciler::new(shop.store.clone(), ReconcileStrategy::FullHistory);
    let once = reconciler.reconcile_order(&order).await.unwrap().customer;
    let twice = reconciler.reconcile_order(&order).await.unwrap().customer;
    assert_eq!((once.total_spent, once.loyalty_points), (twice.total_spent, twice.loyalty_points));
    assert_eq!(twice.loyalty_points, 74);
}

#[tokio::test]
async fn signed_in_checkout_keeps_one_default_address() {
    let shop = shop();
    let user = Uuid::now_v7();
    buy(&shop, "0722333444", 1_000, Some(user)).await;
    let mut cart = cart_with(&[(product("zinc", "Zinc", 300), 1)]);
    let pending = shop.checkout.prepare(&cart, &buyer("0722333444", "Lavington"), PaymentMethod::Mpesa, Some(user)).unwrap();
    shop.checkout.place(pending, &mut cart).await.unwrap();

    let overview = AccountService::new(shop.store.clone()).overview(user).await.unwrap();
    assert_eq!(overview.addresses.len(), 2);
    assert_eq!(overview.addresses.iter().filter(|a| a.is_default).count(), 1);
    assert_eq!(overview.addresses[0].address, "Parklands");
    assert_eq!(overview.orders.len(), 2);
    assert_eq!(overview.customer.unwrap().total_spent, Decimal::new(1_300, 0));

    let owned = shop.store.list_orders(&OrderFilter::owned_by(CustomerKey::User(user))).await.unwrap();
    assert_eq!(owned.len(), 2);
}

#[test]
fn cart_count_matches_persisted_quantities() {
    let a = product("a", "A", 100);
    let b = product("b", "B", 250);
    let mut cart = CartStore::open(MemoryStorage::new());
    cart.add(&a, 1).unwrap();
    cart.add(&b, 3).unwrap();
    cart.add(&a, 2).unwrap();
    cart.set_quantity("b", -5).unwrap();
    cart.add(&b, -2).unwrap();
    cart.remove("missing").unwrap();

    let raw = cart.storage().load(CART_DATA_KEY).unwrap().unwrap();
    let persisted: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
    let sum: u64 = persisted.iter().map(|l| l["quantity"].as_u64().unwrap()).sum();
    assert!(persisted.iter().all(|l| l["quantity"].as_u64().unwrap() > 0));
    assert_eq!(u64::from(cart.count()), sum);
    assert_eq!(stored_count(cart.storage()), cart.count());

    let reopened = CartStore::open(MemoryStorage::with_value(CART_DATA_KEY, raw));
    assert_eq!(reopened.lines(), cart.lines());
}
