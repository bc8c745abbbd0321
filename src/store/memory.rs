//! In-process store.
//!
//! One `RwLock` guards all state, so every operation (including
//! `place_order`) is atomic with respect to every other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OrderFilter, Page, Placement, Store, StoreError};
use crate::domain::aggregates::{Address, Cart, Coupon, NewOrder, Order, Product, User};

#[derive(Debug, Default)]
struct State {
    users: HashMap<Uuid, User>,
    products: HashMap<Uuid, Product>,
    coupons: HashMap<Uuid, Coupon>,
    orders: Vec<Order>,
    order_keys: HashMap<String, Uuid>,
}

impl State {
    fn user_mut(&mut self, id: Uuid) -> Result<&mut User, StoreError> {
        self.users.get_mut(&id).ok_or(StoreError::UserNotFound(id))
    }

    fn order_mut(&mut self, id: Uuid) -> Option<&mut Order> { self.orders.iter_mut().find(|o| o.id == id) }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("email"));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn save_cart(&self, user_id: Uuid, cart: &Cart) -> Result<(), StoreError> {
        self.state.write().await.user_mut(user_id)?.cart = cart.clone();
        Ok(())
    }

    async fn add_address(&self, user_id: Uuid, address: Address) -> Result<Address, StoreError> {
        self.state.write().await.user_mut(user_id)?.addresses.push(address.clone());
        Ok(address)
    }

    async fn remove_address(&self, user_id: Uuid, address_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let user = state.user_mut(user_id)?;
        let before = user.addresses.len();
        user.addresses.retain(|a| a.id != address_id);
        Ok(user.addresses.len() != before)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>, StoreError> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.products.get(id).cloned()).collect())
    }

    async fn insert_product(&self, product: Product) -> Result<Product, StoreError> {
        self.state.write().await.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get_coupon(&self, id: Uuid) -> Result<Option<Coupon>, StoreError> {
        Ok(self.state.read().await.coupons.get(&id).cloned())
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        Ok(self.state.read().await.coupons.values().find(|c| c.code == code).cloned())
    }

    async fn insert_coupon(&self, coupon: Coupon) -> Result<Coupon, StoreError> {
        let mut state = self.state.write().await;
        if state.coupons.values().any(|c| c.code == coupon.code) {
            return Err(StoreError::Duplicate("code"));
        }
        state.coupons.insert(coupon.id, coupon.clone());
        Ok(coupon)
    }

    async fn consume_coupon(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.coupons.get_mut(&id) {
            Some(coupon) if coupon.is_applicable(now) => {
                coupon.usage_count += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_coupon(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some(coupon) = self.state.write().await.coupons.get_mut(&id) {
            coupon.usage_count = (coupon.usage_count - 1).max(0);
        }
        Ok(())
    }

    async fn place_order(&self, new_order: NewOrder) -> Result<Placement, StoreError> {
        let mut state = self.state.write().await;

        if let Some(key) = &new_order.idempotency_key {
            if let Some(existing) = state.order_keys.get(key).and_then(|id| state.orders.iter().find(|o| o.id == *id)) {
                return Ok(Placement::Duplicate(existing.clone()));
            }
        }

        let mut wanted: Vec<(Uuid, i32)> = Vec::with_capacity(new_order.items.len());
        for item in &new_order.items {
            match wanted.iter_mut().find(|(id, _)| *id == item.product) {
                Some((_, qty)) => *qty += item.quantity,
                None => wanted.push((item.product, item.quantity)),
            }
        }
        for (product_id, qty) in &wanted {
            let product = state.products.get(product_id).ok_or(StoreError::ProductNotFound(*product_id))?;
            if !product.has_stock_for(*qty) {
                return Err(StoreError::InsufficientStock(*product_id));
            }
        }

        let now = Utc::now();
        for (product_id, qty) in wanted {
            if let Some(product) = state.products.get_mut(&product_id) {
                product.quantity -= qty;
                product.sold += qty;
                product.updated_at = now;
            }
        }

        let order = new_order.into_order(now);
        if let Some(key) = &order.idempotency_key {
            state.order_keys.insert(key.clone(), order.id);
        }
        if let Some(user) = state.users.get_mut(&order.user_id) {
            user.cart.clear();
        }
        state.orders.push(order.clone());

        Ok(Placement::Created(order))
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.state.read().await.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders(&self, filter: OrderFilter, page: Page) -> Result<(Vec<Order>, u64), StoreError> {
        let state = self.state.read().await;
        let mut matching: Vec<&Order> = state
            .orders
            .iter()
            .filter(|o| filter.user_id.map_or(true, |uid| o.user_id == uid))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        let total = matching.len() as u64;
        let data = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();
        Ok((data, total))
    }

    async fn mark_order_paid(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Order>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.order_mut(id).map(|order| {
            order.mark_paid(at);
            order.clone()
        }))
    }

    async fn mark_order_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Order>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.order_mut(id).map(|order| {
            order.mark_delivered(at);
            order.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderItem, PaymentMethod, Role, ShippingAddress};
    use rust_decimal_macros::dec;
    use testresult::TestResult;

    fn new_order(user_id: Uuid, product: Uuid, quantity: i32, key: Option<&str>) -> NewOrder {
        NewOrder {
            user_id,
            items: vec![OrderItem { product, quantity, price: dec!(10) }],
            subtotal: dec!(10) * rust_decimal::Decimal::from(quantity),
            discount: dec!(0),
            shipping_cost: dec!(50),
            total_amount: dec!(10) * rust_decimal::Decimal::from(quantity) + dec!(50),
            payment_method: PaymentMethod::Cash,
            paid_at: None,
            shipping_address: ShippingAddress { city: "Alexandria".into(), details: "Corniche".into() },
            idempotency_key: key.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn place_order_adjusts_stock_and_clears_cart() -> TestResult {
        let store = MemoryStore::new();
        let product = store.insert_product(Product::new("Mug", dec!(10), 5)).await?;
        let mut user = User::new("Omar", "omar@example.com", Role::User);
        user.cart.add_item(product.id, 2)?;
        let user = store.insert_user(user).await?;

        let placement = store.place_order(new_order(user.id, product.id, 2, None)).await?;
        assert!(placement.is_created());

        let product = store.get_product(product.id).await?.ok_or("product vanished")?;
        assert_eq!((product.quantity, product.sold), (3, 2));
        let user = store.get_user(user.id).await?.ok_or("user vanished")?;
        assert!(user.cart.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn short_stock_rejects_whole_order() -> TestResult {
        let store = MemoryStore::new();
        let product = store.insert_product(Product::new("Mug", dec!(10), 1)).await?;
        let user = store.insert_user(User::new("Omar", "omar@example.com", Role::User)).await?;

        let result = store.place_order(new_order(user.id, product.id, 2, None)).await;
        assert!(matches!(result, Err(StoreError::InsufficientStock(id)) if id == product.id));

        let (orders, total) = store.list_orders(OrderFilter::default(), Page::default()).await?;
        assert!(orders.is_empty() && total == 0);
        assert_eq!(store.get_product(product.id).await?.map(|p| p.quantity), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn repeated_idempotency_key_is_a_no_op() -> TestResult {
        let store = MemoryStore::new();
        let product = store.insert_product(Product::new("Mug", dec!(10), 5)).await?;
        let user = store.insert_user(User::new("Omar", "omar@example.com", Role::User)).await?;

        let first = store.place_order(new_order(user.id, product.id, 1, Some("tok-1"))).await?;
        let second = store.place_order(new_order(user.id, product.id, 1, Some("tok-1"))).await?;
        assert!(first.is_created());
        assert_eq!(second, Placement::Duplicate(first.into_order()));
        assert_eq!(store.get_product(product.id).await?.map(|p| p.quantity), Some(4));
        Ok(())
    }

    #[tokio::test]
    async fn coupon_usage_never_exceeds_cap() -> TestResult {
        let store = MemoryStore::new();
        let coupon = Coupon::new(
            "ONCE",
            crate::domain::value_objects::Percentage::new(dec!(5))?,
            Utc::now() + chrono::Duration::days(1),
            1,
        );
        let coupon = store.insert_coupon(coupon).await?;
        assert!(store.consume_coupon(coupon.id, Utc::now()).await?);
        assert!(!store.consume_coupon(coupon.id, Utc::now()).await?);
        store.release_coupon(coupon.id).await?;
        store.release_coupon(coupon.id).await?;
        assert_eq!(store.get_coupon(coupon.id).await?.map(|c| c.usage_count), Some(0));
        Ok(())
    }

    #[tokio::test]
    async fn list_orders_filters_by_owner_and_pages() -> TestResult {
        let store = MemoryStore::new();
        let product = store.insert_product(Product::new("Mug", dec!(10), 50)).await?;
        let a = store.insert_user(User::new("A", "a@example.com", Role::User)).await?;
        let b = store.insert_user(User::new("B", "b@example.com", Role::User)).await?;
        for _ in 0..3 {
            store.place_order(new_order(a.id, product.id, 1, None)).await?;
        }
        store.place_order(new_order(b.id, product.id, 1, None)).await?;

        let (page, total) = store.list_orders(OrderFilter { user_id: Some(a.id) }, Page::new(Some(1), Some(2))).await?;
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        assert!(page.iter().all(|o| o.user_id == a.id));
        let (all, total) = store.list_orders(OrderFilter::default(), Page::default()).await?;
        assert_eq!((all.len(), total), (4, 4));
        Ok(())
    }
}
