//! Postgres-backed store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{types::Json, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{OrderFilter, Page, Placement, Store, StoreError};
use crate::domain::aggregates::{
    Address, Cart, CartItem, Coupon, NewOrder, Order, OrderItem, Product, ShippingAddress, User,
};
use crate::domain::value_objects::Percentage;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow { id: Uuid, name: String, email: String, role: String, cart_coupon_id: Option<Uuid> }

#[derive(Debug, sqlx::FromRow)]
struct AddressRow { id: Uuid, alias: String, city: String, details: String }

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow { id: Uuid, product_id: Uuid, quantity: i32 }

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid, title: String, description: String, price: Decimal, price_after_discount: Option<Decimal>,
    quantity: i32, sold: i32, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct CouponRow { id: Uuid, code: String, discount: Decimal, expiration_date: DateTime<Utc>, max_usage: i32, usage_count: i32 }

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid, user_id: Uuid, items: Json<Vec<OrderItem>>, subtotal: Decimal, discount: Decimal,
    shipping_cost: Decimal, total_amount: Decimal, payment_method: String, is_paid: bool,
    paid_at: Option<DateTime<Utc>>, is_delivered: bool, delivered_at: Option<DateTime<Utc>>,
    shipping_address: Json<ShippingAddress>, idempotency_key: Option<String>,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            id: r.id, title: r.title, description: r.description, price: r.price,
            price_after_discount: r.price_after_discount, quantity: r.quantity, sold: r.sold,
            created_at: r.created_at, updated_at: r.updated_at,
        }
    }
}

impl TryFrom<CouponRow> for Coupon {
    type Error = StoreError;
    fn try_from(r: CouponRow) -> Result<Self, Self::Error> {
        let discount = Percentage::new(r.discount).map_err(|e| StoreError::Corrupt(format!("coupon {}: {e}", r.id)))?;
        Ok(Coupon { id: r.id, code: r.code, discount, expiration_date: r.expiration_date, max_usage: r.max_usage, usage_count: r.usage_count })
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let payment_method = r.payment_method.parse().map_err(StoreError::Corrupt)?;
        Ok(Order {
            id: r.id, user_id: r.user_id, items: r.items.0, subtotal: r.subtotal, discount: r.discount,
            shipping_cost: r.shipping_cost, total_amount: r.total_amount, payment_method, is_paid: r.is_paid,
            paid_at: r.paid_at, is_delivered: r.is_delivered, delivered_at: r.delivered_at,
            shipping_address: r.shipping_address.0, idempotency_key: r.idempotency_key,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

fn unique_violation(field: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate(field),
        _ => StoreError::Database(e),
    }
}

/// Sums quantities per product so each product is decremented once.
fn stock_demand(items: &[OrderItem]) -> Vec<(Uuid, i32)> {
    let mut wanted: Vec<(Uuid, i32)> = Vec::with_capacity(items.len());
    for item in items {
        match wanted.iter_mut().find(|(id, _)| *id == item.product) {
            Some((_, qty)) => *qty += item.quantity,
            None => wanted.push((item.product, item.quantity)),
        }
    }
    wanted
}

async fn take_stock(tx: &mut Transaction<'_, Postgres>, product_id: Uuid, quantity: i32) -> Result<(), StoreError> {
    let updated = sqlx::query("UPDATE products SET quantity = quantity - $2, sold = sold + $2, updated_at = NOW() WHERE id = $1 AND quantity >= $2")
        .bind(product_id).bind(quantity).execute(&mut **tx).await?;
    if updated.rows_affected() == 1 {
        return Ok(());
    }
    let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
        .bind(product_id).fetch_one(&mut **tx).await?;
    Err(if exists { StoreError::InsufficientStock(product_id) } else { StoreError::ProductNotFound(product_id) })
}

async fn clear_cart(tx: &mut Transaction<'_, Postgres>, user_id: Uuid) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(user_id).execute(&mut **tx).await?;
    sqlx::query("UPDATE users SET cart_coupon_id = NULL WHERE id = $1").bind(user_id).execute(&mut **tx).await?;
    Ok(())
}

const INSERT_ORDER: &str = "INSERT INTO orders (id, user_id, items, subtotal, discount, shipping_cost, total_amount, payment_method, is_paid, paid_at, is_delivered, delivered_at, shipping_address, idempotency_key, created_at, updated_at) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
    ON CONFLICT (idempotency_key) DO NOTHING RETURNING *";

#[async_trait]
impl Store for PgStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let Some(row) = sqlx::query_as::<_, UserRow>("SELECT id, name, email, role, cart_coupon_id FROM users WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?
        else {
            return Ok(None);
        };
        let addresses = sqlx::query_as::<_, AddressRow>("SELECT id, alias, city, details FROM addresses WHERE user_id = $1 ORDER BY created_at, id")
            .bind(id).fetch_all(&self.pool).await?;
        let items = sqlx::query_as::<_, CartItemRow>("SELECT id, product_id, quantity FROM cart_items WHERE user_id = $1 ORDER BY position")
            .bind(id).fetch_all(&self.pool).await?;
        let role = row.role.parse().map_err(StoreError::Corrupt)?;
        Ok(Some(User {
            id: row.id,
            name: row.name,
            email: row.email,
            role,
            addresses: addresses.into_iter().map(|a| Address { id: a.id, alias: a.alias, city: a.city, details: a.details }).collect(),
            cart: Cart {
                items: items.into_iter().map(|i| CartItem { id: i.id, product_id: i.product_id, quantity: i.quantity }).collect(),
                coupon_id: row.cart_coupon_id,
            },
        }))
    }

    async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO users (id, name, email, role, cart_coupon_id) VALUES ($1, $2, $3, $4, $5)")
            .bind(user.id).bind(&user.name).bind(&user.email).bind(user.role.as_str()).bind(user.cart.coupon_id)
            .execute(&mut *tx).await.map_err(unique_violation("email"))?;
        for address in &user.addresses {
            sqlx::query("INSERT INTO addresses (id, user_id, alias, city, details) VALUES ($1, $2, $3, $4, $5)")
                .bind(address.id).bind(user.id).bind(&address.alias).bind(&address.city).bind(&address.details)
                .execute(&mut *tx).await?;
        }
        for (position, item) in user.cart.items.iter().enumerate() {
            sqlx::query("INSERT INTO cart_items (id, user_id, product_id, quantity, position) VALUES ($1, $2, $3, $4, $5)")
                .bind(item.id).bind(user.id).bind(item.product_id).bind(item.quantity).bind(position as i32)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(user)
    }

    async fn save_cart(&self, user_id: Uuid, cart: &Cart) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query("UPDATE users SET cart_coupon_id = $2 WHERE id = $1")
            .bind(user_id).bind(cart.coupon_id).execute(&mut *tx).await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::UserNotFound(user_id));
        }
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(user_id).execute(&mut *tx).await?;
        for (position, item) in cart.items.iter().enumerate() {
            sqlx::query("INSERT INTO cart_items (id, user_id, product_id, quantity, position) VALUES ($1, $2, $3, $4, $5)")
                .bind(item.id).bind(user_id).bind(item.product_id).bind(item.quantity).bind(position as i32)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn add_address(&self, user_id: Uuid, address: Address) -> Result<Address, StoreError> {
        sqlx::query("INSERT INTO addresses (id, user_id, alias, city, details) VALUES ($1, $2, $3, $4, $5)")
            .bind(address.id).bind(user_id).bind(&address.alias).bind(&address.city).bind(&address.details)
            .execute(&self.pool).await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => StoreError::UserNotFound(user_id),
                _ => StoreError::Database(e),
            })?;
        Ok(address)
    }

    async fn remove_address(&self, user_id: Uuid, address_id: Uuid) -> Result<bool, StoreError> {
        let deleted = sqlx::query("DELETE FROM addresses WHERE id = $1 AND user_id = $2")
            .bind(address_id).bind(user_id).execute(&self.pool).await?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(Product::from))
    }

    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ANY($1)").bind(ids).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn insert_product(&self, product: Product) -> Result<Product, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>("INSERT INTO products (id, title, description, price, price_after_discount, quantity, sold, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *")
            .bind(product.id).bind(&product.title).bind(&product.description).bind(product.price).bind(product.price_after_discount)
            .bind(product.quantity).bind(product.sold).bind(product.created_at).bind(product.updated_at)
            .fetch_one(&self.pool).await?;
        Ok(row.into())
    }

    async fn get_coupon(&self, id: Uuid) -> Result<Option<Coupon>, StoreError> {
        sqlx::query_as::<_, CouponRow>("SELECT id, code, discount, expiration_date, max_usage, usage_count FROM coupons WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?.map(Coupon::try_from).transpose()
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        sqlx::query_as::<_, CouponRow>("SELECT id, code, discount, expiration_date, max_usage, usage_count FROM coupons WHERE code = $1")
            .bind(code).fetch_optional(&self.pool).await?.map(Coupon::try_from).transpose()
    }

    async fn insert_coupon(&self, coupon: Coupon) -> Result<Coupon, StoreError> {
        sqlx::query("INSERT INTO coupons (id, code, discount, expiration_date, max_usage, usage_count) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(coupon.id).bind(&coupon.code).bind(coupon.discount.value()).bind(coupon.expiration_date)
            .bind(coupon.max_usage).bind(coupon.usage_count)
            .execute(&self.pool).await.map_err(unique_violation("code"))?;
        Ok(coupon)
    }

    async fn consume_coupon(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let updated = sqlx::query("UPDATE coupons SET usage_count = usage_count + 1 WHERE id = $1 AND usage_count < max_usage AND expiration_date > $2")
            .bind(id).bind(now).execute(&self.pool).await?;
        Ok(updated.rows_affected() == 1)
    }

    async fn release_coupon(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE coupons SET usage_count = usage_count - 1 WHERE id = $1 AND usage_count > 0")
            .bind(id).execute(&self.pool).await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(user_id = %new_order.user_id))]
    async fn place_order(&self, new_order: NewOrder) -> Result<Placement, StoreError> {
        let order = new_order.into_order(Utc::now());
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, OrderRow>(INSERT_ORDER)
            .bind(order.id).bind(order.user_id).bind(Json(&order.items)).bind(order.subtotal).bind(order.discount)
            .bind(order.shipping_cost).bind(order.total_amount).bind(order.payment_method.as_str()).bind(order.is_paid)
            .bind(order.paid_at).bind(order.is_delivered).bind(order.delivered_at).bind(Json(&order.shipping_address))
            .bind(&order.idempotency_key).bind(order.created_at).bind(order.updated_at)
            .fetch_optional(&mut *tx).await?;

        let Some(row) = inserted else {
            tx.rollback().await?;
            let existing = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE idempotency_key = $1")
                .bind(&order.idempotency_key).fetch_optional(&self.pool).await?
                .ok_or_else(|| StoreError::Corrupt("idempotency key conflict without an order".into()))?;
            tracing::info!(order_id = %existing.id, "order already placed for this idempotency key");
            return Ok(Placement::Duplicate(existing.try_into()?));
        };

        for (product_id, quantity) in stock_demand(&order.items) {
            take_stock(&mut tx, product_id, quantity).await?;
        }
        clear_cart(&mut tx, order.user_id).await?;
        tx.commit().await?;

        Ok(Placement::Created(row.try_into()?))
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?.map(Order::try_from).transpose()
    }

    async fn list_orders(&self, filter: OrderFilter, page: Page) -> Result<(Vec<Order>, u64), StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE ($1::uuid IS NULL OR user_id = $1) ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3")
            .bind(filter.user_id).bind(i64::from(page.limit)).bind(i64::from(page.offset()))
            .fetch_all(&self.pool).await?;
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE ($1::uuid IS NULL OR user_id = $1)")
            .bind(filter.user_id).fetch_one(&self.pool).await?;
        let orders = rows.into_iter().map(Order::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok((orders, u64::try_from(total).unwrap_or_default()))
    }

    async fn mark_order_paid(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>("UPDATE orders SET is_paid = TRUE, paid_at = COALESCE(paid_at, $2), updated_at = CASE WHEN is_paid THEN updated_at ELSE $2 END WHERE id = $1 RETURNING *")
            .bind(id).bind(at).fetch_optional(&self.pool).await?.map(Order::try_from).transpose()
    }

    async fn mark_order_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>("UPDATE orders SET is_delivered = TRUE, delivered_at = COALESCE(delivered_at, $2), updated_at = CASE WHEN is_delivered THEN updated_at ELSE $2 END WHERE id = $1 RETURNING *")
            .bind(id).bind(at).fetch_optional(&self.pool).await?.map(Order::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{PaymentMethod, Role};
    use rust_decimal_macros::dec;
    use testresult::TestResult;

    #[test]
    fn stock_demand_merges_repeated_products() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let items = [
            OrderItem { product: a, quantity: 1, price: dec!(5) },
            OrderItem { product: b, quantity: 2, price: dec!(5) },
            OrderItem { product: a, quantity: 3, price: dec!(5) },
        ];
        assert_eq!(stock_demand(&items), vec![(a, 4), (b, 2)]);
    }

    fn new_order(user_id: Uuid, lines: &[(Uuid, i32)], key: Option<&str>) -> NewOrder {
        let items: Vec<OrderItem> = lines.iter().map(|&(product, quantity)| OrderItem { product, quantity, price: dec!(10) }).collect();
        let subtotal: Decimal = items.iter().map(OrderItem::line_total).sum();
        NewOrder {
            user_id,
            items,
            subtotal,
            discount: dec!(0),
            shipping_cost: dec!(50),
            total_amount: subtotal + dec!(50),
            payment_method: PaymentMethod::Card,
            paid_at: Some(Utc::now()),
            shipping_address: ShippingAddress { city: "Aswan".into(), details: "Corniche 9".into() },
            idempotency_key: key.map(str::to_owned),
        }
    }

    async fn shopper(store: &PgStore, lines: &[(Uuid, i32)]) -> Result<User, StoreError> {
        let mut user = User::new("Omar", format!("{}@example.com", Uuid::now_v7()), Role::User);
        for &(product, quantity) in lines {
            user.cart.add_item(product, quantity).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        }
        store.insert_user(user).await
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn place_order_commits_stock_and_cart_together(pool: PgPool) -> TestResult {
        let store = PgStore::new(pool);
        let mug = store.insert_product(Product::new("Mug", dec!(10), 5)).await?;
        let user = shopper(&store, &[(mug.id, 2)]).await?;

        let placement = store.place_order(new_order(user.id, &[(mug.id, 2)], Some("tok_1"))).await?;
        assert!(placement.is_created());

        let mug = store.get_product(mug.id).await?.ok_or("product vanished")?;
        assert_eq!((mug.quantity, mug.sold), (3, 2));
        let user = store.get_user(user.id).await?.ok_or("user vanished")?;
        assert!(user.cart.is_empty());
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn replayed_key_returns_the_first_order(pool: PgPool) -> TestResult {
        let store = PgStore::new(pool);
        let mug = store.insert_product(Product::new("Mug", dec!(10), 5)).await?;
        let user = shopper(&store, &[]).await?;

        let first = store.place_order(new_order(user.id, &[(mug.id, 2)], Some("tok_1"))).await?;
        let replay = store.place_order(new_order(user.id, &[(mug.id, 2)], Some("tok_1"))).await?;
        assert!(!replay.is_created());
        assert_eq!(replay.into_order().id, first.into_order().id);

        assert_eq!(store.list_orders(OrderFilter::default(), Page::default()).await?.1, 1);
        assert_eq!(store.get_product(mug.id).await?.map(|p| p.quantity), Some(3));
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn short_stock_rolls_back_every_write(pool: PgPool) -> TestResult {
        let store = PgStore::new(pool);
        let mug = store.insert_product(Product::new("Mug", dec!(10), 5)).await?;
        let lamp = store.insert_product(Product::new("Lamp", dec!(10), 1)).await?;
        let lines = [(mug.id, 2), (lamp.id, 3)];
        let user = shopper(&store, &lines).await?;

        let result = store.place_order(new_order(user.id, &lines, Some("tok_1"))).await;
        assert!(matches!(result, Err(StoreError::InsufficientStock(id)) if id == lamp.id));

        assert_eq!(store.list_orders(OrderFilter::default(), Page::default()).await?.1, 0);
        assert_eq!(store.get_product(mug.id).await?.map(|p| (p.quantity, p.sold)), Some((5, 0)));
        let user = store.get_user(user.id).await?.ok_or("user vanished")?;
        assert_eq!(user.cart.items().len(), 2);
        Ok(())
    }
}
