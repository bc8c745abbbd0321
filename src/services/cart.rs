//! Cart management and the coupon life cycle on a cart.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::load_user;
use crate::domain::aggregates::{Coupon, CouponSummary, OrderItem, Product, ProductSummary, User};
use crate::domain::pricing;
use crate::error::AppError;
use crate::store::Store;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: Uuid,
    /// `None` once the product has been removed from the catalog.
    pub product: Option<ProductSummary>,
    pub quantity: i32,
}

/// The cart as shown to its owner, with a price preview that leaves
/// shipping out.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub coupon: Option<CouponSummary>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total_after_discount: Decimal,
}

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    /// Returns the cart, dropping an applied coupon that has expired or been
    /// deleted since it was applied. An expired coupon gets its use back.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, AppError> {
        let mut user = load_user(self.store.as_ref(), user_id).await?;
        let coupon = self.revalidate_coupon(&mut user).await?;
        self.view(&user, coupon).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_item(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> Result<CartView, AppError> {
        let mut user = load_user(self.store.as_ref(), user_id).await?;
        if user.cart.items().iter().any(|i| i.product_id == product_id) {
            return Err(AppError::DuplicateCartItem(product_id));
        }
        let product = self.product(product_id).await?;
        if !product.has_stock_for(quantity) {
            return Err(AppError::NotEnoughQuantity(product_id));
        }
        user.cart.add_item(product_id, quantity)?;
        self.store.save_cart(user.id, &user.cart).await?;
        self.current_view(&user).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_item(&self, user_id: Uuid, item_id: Uuid, quantity: i32) -> Result<CartView, AppError> {
        let mut user = load_user(self.store.as_ref(), user_id).await?;
        if user.cart.is_empty() {
            return Err(AppError::EmptyCart);
        }
        let product_id = user.cart.item(item_id).ok_or(AppError::CartItemNotFound(item_id))?.product_id;
        let product = self.product(product_id).await?;
        if !product.has_stock_for(quantity) {
            return Err(AppError::NotEnoughQuantity(product_id));
        }
        user.cart.update_quantity(item_id, quantity)?;
        self.store.save_cart(user.id, &user.cart).await?;
        self.current_view(&user).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<CartView, AppError> {
        let mut user = load_user(self.store.as_ref(), user_id).await?;
        if user.cart.is_empty() {
            return Err(AppError::EmptyCart);
        }
        user.cart.remove_item(item_id)?;
        self.store.save_cart(user.id, &user.cart).await?;
        self.current_view(&user).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn apply_coupon(&self, user_id: Uuid, code: &str) -> Result<CartView, AppError> {
        let mut user = load_user(self.store.as_ref(), user_id).await?;
        if user.cart.is_empty() {
            return Err(AppError::EmptyCart);
        }
        if user.cart.has_coupon() {
            return Err(AppError::CouponAlreadyApplied);
        }
        let coupon = self.store.find_coupon_by_code(code).await?.ok_or_else(|| AppError::CouponNotFound(code.to_owned()))?;
        let now = Utc::now();
        if !coupon.is_applicable(now) || !self.store.consume_coupon(coupon.id, now).await? {
            return Err(AppError::CouponNotApplicable(code.to_owned()));
        }

        user.cart.attach_coupon(coupon.id)?;
        if let Err(e) = self.store.save_cart(user.id, &user.cart).await {
            self.release(coupon.id).await;
            return Err(e.into());
        }
        tracing::info!(coupon_id = %coupon.id, "coupon applied");
        self.current_view(&user).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn revoke_coupon(&self, user_id: Uuid) -> Result<CartView, AppError> {
        let mut user = load_user(self.store.as_ref(), user_id).await?;
        let coupon_id = user.cart.detach_coupon().ok_or(AppError::NoCouponApplied)?;
        self.store.save_cart(user.id, &user.cart).await?;
        self.store.release_coupon(coupon_id).await?;
        tracing::info!(%coupon_id, "coupon revoked");
        self.view(&user, None).await
    }

    async fn product(&self, id: Uuid) -> Result<Product, AppError> {
        self.store.get_product(id).await?.ok_or(AppError::ProductNotFound(id))
    }

    async fn release(&self, coupon_id: Uuid) {
        if let Err(e) = self.store.release_coupon(coupon_id).await {
            tracing::warn!(%coupon_id, error = %e, "failed to give back coupon use");
        }
    }

    async fn revalidate_coupon(&self, user: &mut User) -> Result<Option<Coupon>, AppError> {
        let Some(coupon_id) = user.cart.coupon_id else { return Ok(None) };
        match self.store.get_coupon(coupon_id).await? {
            Some(coupon) if !coupon.is_expired(Utc::now()) => Ok(Some(coupon)),
            Some(_) => {
                user.cart.detach_coupon();
                self.store.save_cart(user.id, &user.cart).await?;
                self.store.release_coupon(coupon_id).await?;
                tracing::info!(%coupon_id, "expired coupon removed from cart");
                Ok(None)
            }
            None => {
                user.cart.detach_coupon();
                self.store.save_cart(user.id, &user.cart).await?;
                tracing::info!(%coupon_id, "deleted coupon removed from cart");
                Ok(None)
            }
        }
    }

    async fn current_view(&self, user: &User) -> Result<CartView, AppError> {
        let coupon = match user.cart.coupon_id {
            Some(id) => self.store.get_coupon(id).await?,
            None => None,
        };
        self.view(user, coupon).await
    }

    async fn view(&self, user: &User, coupon: Option<Coupon>) -> Result<CartView, AppError> {
        let products: HashMap<Uuid, Product> = self
            .store
            .get_products(&user.cart.product_ids())
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let priced: Vec<OrderItem> = user
            .cart
            .items()
            .iter()
            .filter_map(|item| {
                products.get(&item.product_id).map(|p| OrderItem {
                    product: p.id,
                    quantity: item.quantity,
                    price: p.effective_price(),
                })
            })
            .collect();
        let discount = coupon
            .as_ref()
            .filter(|c| !c.is_expired(Utc::now()))
            .map(|c| c.discount.value())
            .unwrap_or(Decimal::ZERO);
        let preview = pricing::total(priced, discount, Decimal::ZERO);

        Ok(CartView {
            items: user
                .cart
                .items()
                .iter()
                .map(|item| CartLine {
                    id: item.id,
                    product: products.get(&item.product_id).map(Product::summary),
                    quantity: item.quantity,
                })
                .collect(),
            coupon: coupon.as_ref().map(Coupon::summary),
            subtotal: preview.subtotal,
            discount: preview.discount,
            total_after_discount: preview.total_amount,
        })
    }
}
