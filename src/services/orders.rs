//! Order placement.
//!
//! Cash orders and paid card checkouts end in the same commit,
//! [`Store::place_order`], which writes the order, takes the stock and clears
//! the cart as one unit. Card checkouts get there through the gateway: the
//! priced order is parked in the checkout session's metadata and comes back
//! in the signed completion webhook.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use super::{load_user, Caller};
use crate::config::Config;
use crate::domain::aggregates::{
    NewOrder, Order, PaymentMethod, Product, ProductSummary, ShippingAddress, User, UserSummary,
};
use crate::domain::events::OrderEvent;
use crate::domain::pricing::{self, Quote};
use crate::domain::value_objects::to_minor_units;
use crate::error::AppError;
use crate::messaging::EventPublisher;
use crate::payments::webhook::{self, SignatureError, CHECKOUT_COMPLETED};
use crate::payments::{CheckoutMetadata, CheckoutSession, CheckoutSessionRequest, PaymentGateway, SessionLineItem};
use crate::store::{OrderFilter, Page, Store, StoreError};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    /// `None` once the product has been removed from the catalog.
    pub product: Option<ProductSummary>,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
}

/// An order with its owner and products filled in.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub id: Uuid,
    pub user: Option<UserSummary>,
    pub user_id: Uuid,
    pub items: Vec<OrderLine>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_cost: Decimal,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub shipping_address: ShippingAddress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderDetails {
    fn new(order: Order, user: Option<UserSummary>, products: &HashMap<Uuid, Product>) -> Self {
        Self {
            id: order.id,
            user,
            user_id: order.user_id,
            items: order
                .items
                .into_iter()
                .map(|item| OrderLine {
                    product: products.get(&item.product).map(Product::summary),
                    product_id: item.product,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
            subtotal: order.subtotal,
            discount: order.discount,
            shipping_cost: order.shipping_cost,
            total_amount: order.total_amount,
            payment_method: order.payment_method,
            is_paid: order.is_paid,
            paid_at: order.paid_at,
            is_delivered: order.is_delivered,
            delivered_at: order.delivered_at,
            shipping_address: order.shipping_address,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// Result of a completion webhook.
#[derive(Clone, Debug, PartialEq)]
pub struct Reconciled {
    /// `false` when the event was a repeat delivery and the order already
    /// existed.
    pub created: bool,
    pub order: OrderDetails,
}

/// A checked and priced cart, ready to become an order.
struct Prepared {
    user: User,
    shipping_address: ShippingAddress,
    quote: Quote,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    publisher: Arc<dyn EventPublisher>,
    config: Arc<Config>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        publisher: Arc<dyn EventPublisher>,
        config: Arc<Config>,
    ) -> Self {
        Self { store, gateway, publisher, config }
    }

    /// Checks the preconditions shared by both payment methods, first
    /// failure wins: the address belongs to the user, the cart has items,
    /// every product still exists. Stock is only checked at commit.
    async fn prepare(&self, user_id: Uuid, address_id: Uuid) -> Result<Prepared, AppError> {
        let user = load_user(self.store.as_ref(), user_id).await?;
        let shipping_address = user.address(address_id).ok_or(AppError::AddressNotFound(address_id))?.to_shipping();
        if user.cart.is_empty() {
            return Err(AppError::EmptyCart);
        }

        let snapshot = user.cart.items().to_vec();
        let product_ids: Vec<Uuid> = snapshot.iter().map(|i| i.product_id).collect();
        let products = self.products(&product_ids).await?;
        if let Some(missing) = snapshot.iter().find(|i| !products.contains_key(&i.product_id)) {
            return Err(AppError::ProductNotFound(missing.product_id));
        }

        let coupon = match user.cart.coupon_id {
            Some(id) => self.store.get_coupon(id).await?,
            None => None,
        };
        let quote = pricing::price(&snapshot, &products, coupon.as_ref(), self.config.shipping_cost, Utc::now())?;
        Ok(Prepared { user, shipping_address, quote })
    }

    #[tracing::instrument(skip(self))]
    pub async fn place_cash_order(&self, user_id: Uuid, address_id: Uuid) -> Result<OrderDetails, AppError> {
        let Prepared { user, shipping_address, quote } = self.prepare(user_id, address_id).await?;
        let new_order = NewOrder {
            user_id: user.id,
            items: quote.items,
            subtotal: quote.subtotal,
            discount: quote.discount,
            shipping_cost: quote.shipping_cost,
            total_amount: quote.total_amount,
            payment_method: PaymentMethod::Cash,
            paid_at: None,
            shipping_address,
            idempotency_key: None,
        };

        let order = self.store.place_order(new_order).await?.into_order();
        tracing::info!(order_id = %order.id, total = %order.total_amount, "cash order placed");
        self.publish(OrderEvent::created(&order)).await;
        self.details(order).await
    }

    /// Opens a hosted checkout for the cart. Nothing is written: the cart,
    /// the stock and the order table are left as they are until the gateway
    /// confirms payment.
    #[tracing::instrument(skip(self))]
    pub async fn create_checkout_session(&self, user_id: Uuid, address_id: Uuid) -> Result<CheckoutSession, AppError> {
        let Prepared { user, shipping_address, quote } = self.prepare(user_id, address_id).await?;

        let minor = |amount: Decimal| {
            to_minor_units(amount).ok_or_else(|| AppError::Validation(format!("amount {amount} cannot be charged")))
        };
        let line_items = vec![
            SessionLineItem { name: format!("Order for {}", user.name), unit_amount: minor(quote.discounted_subtotal())?, quantity: 1 },
            SessionLineItem { name: "Shipping".to_owned(), unit_amount: minor(quote.shipping_cost)?, quantity: 1 },
        ];

        let metadata = CheckoutMetadata {
            order_token: Uuid::new_v4().to_string(),
            user_id: user.id,
            items: quote.items,
            subtotal: quote.subtotal,
            discount: quote.discount,
            shipping_cost: quote.shipping_cost,
            total_amount: quote.total_amount,
            shipping_address,
        };
        let request = CheckoutSessionRequest {
            customer_email: user.email.clone(),
            client_reference_id: user.id.to_string(),
            currency: self.config.currency.clone(),
            line_items,
            success_url: self.config.checkout_success_url.clone(),
            cancel_url: self.config.checkout_cancel_url.clone(),
            metadata: metadata.to_map()?,
        };

        let session = self.gateway.create_checkout_session(request).await?;
        tracing::info!(session_id = %session.id, order_token = %metadata.order_token, "checkout session opened");
        Ok(session)
    }

    /// Authenticates a gateway callback and, for a completed checkout,
    /// commits the order parked in its metadata. A repeat delivery of the
    /// same checkout finds the order by its token and writes nothing.
    #[tracing::instrument(skip_all)]
    pub async fn reconcile_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<Reconciled, AppError> {
        let header = signature.ok_or(SignatureError::MissingSignature)?;
        let tolerance = Duration::seconds(self.config.webhook_tolerance_secs);
        let event = webhook::verify(payload, header, &self.config.stripe_webhook_secret, tolerance, Utc::now())
            .map_err(|e| {
                tracing::warn!(error = %e, "rejected webhook");
                e
            })?;

        if event.kind != CHECKOUT_COMPLETED {
            return Err(AppError::UnhandledEvent(event.kind));
        }
        let session = event.completed_session().map_err(|e| AppError::MalformedWebhook(e.to_string()))?;
        let metadata = CheckoutMetadata::from_map(&session.metadata)?;
        let token = metadata.order_token.clone();

        let placement = match self.store.place_order(metadata.into_new_order(Utc::now())).await {
            Ok(placement) => placement,
            Err(StoreError::InsufficientStock(product_id)) => {
                tracing::error!(event_id = %event.id, session_id = %session.id, %product_id, "paid checkout cannot be fulfilled");
                return Err(AppError::InsufficientStock(product_id));
            }
            Err(e) => return Err(e.into()),
        };

        let created = placement.is_created();
        let order = placement.into_order();
        if created {
            tracing::info!(order_id = %order.id, event_id = %event.id, "card order placed");
            self.publish(OrderEvent::created(&order)).await;
        } else {
            tracing::info!(order_id = %order.id, event_id = %event.id, order_token = %token, "repeat webhook ignored");
        }
        Ok(Reconciled { created, order: self.details(order).await? })
    }

    /// Users see their own orders, admins see all.
    pub async fn list_orders(&self, caller: Caller, page: Page) -> Result<(Vec<OrderDetails>, u64), AppError> {
        let filter = OrderFilter { user_id: (!caller.is_admin()).then_some(caller.id) };
        let (orders, total) = self.store.list_orders(filter, page).await?;
        let product_ids: Vec<Uuid> = orders.iter().flat_map(|o| o.items.iter().map(|i| i.product)).collect();
        let user_ids: Vec<Uuid> = orders.iter().map(|o| o.user_id).collect();
        let products = self.products(&product_ids).await?;
        let users = self.users(&user_ids).await?;
        let details = orders
            .into_iter()
            .map(|o| {
                let user = users.get(&o.user_id).cloned();
                OrderDetails::new(o, user, &products)
            })
            .collect();
        Ok((details, total))
    }

    /// Someone else's order is reported as missing to a non-admin caller.
    pub async fn get_order(&self, caller: Caller, order_id: Uuid) -> Result<OrderDetails, AppError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .filter(|o| caller.is_admin() || o.is_owned_by(caller.id))
            .ok_or(AppError::OrderNotFound(order_id))?;
        self.details(order).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_paid(&self, order_id: Uuid) -> Result<OrderDetails, AppError> {
        let current = self.store.get_order(order_id).await?.ok_or(AppError::OrderNotFound(order_id))?;
        if current.is_paid {
            return self.details(current).await;
        }
        let order = self.store.mark_order_paid(order_id, Utc::now()).await?.ok_or(AppError::OrderNotFound(order_id))?;
        self.publish(OrderEvent::MarkedPaid { order_id }).await;
        self.details(order).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_delivered(&self, order_id: Uuid) -> Result<OrderDetails, AppError> {
        let current = self.store.get_order(order_id).await?.ok_or(AppError::OrderNotFound(order_id))?;
        if current.is_delivered {
            return self.details(current).await;
        }
        let order = self.store.mark_order_delivered(order_id, Utc::now()).await?.ok_or(AppError::OrderNotFound(order_id))?;
        self.publish(OrderEvent::MarkedDelivered { order_id }).await;
        self.details(order).await
    }

    async fn publish(&self, event: OrderEvent) {
        if let Err(e) = self.publisher.publish(&event).await {
            tracing::warn!(subject = event.subject(), error = %e, "failed to publish order event");
        }
    }

    async fn products(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>, AppError> {
        let ids: Vec<Uuid> = ids.iter().copied().collect::<HashSet<_>>().into_iter().collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self.store.get_products(&ids).await?.into_iter().map(|p| (p.id, p)).collect())
    }

    async fn users(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, UserSummary>, AppError> {
        let mut users = HashMap::new();
        let ids: HashSet<Uuid> = ids.iter().copied().collect();
        for id in ids {
            if let Some(user) = self.store.get_user(id).await? {
                users.insert(id, user.summary());
            }
        }
        Ok(users)
    }

    async fn details(&self, order: Order) -> Result<OrderDetails, AppError> {
        let product_ids: Vec<Uuid> = order.items.iter().map(|i| i.product).collect();
        let products = self.products(&product_ids).await?;
        let user = self.store.get_user(order.user_id).await?.map(|u| u.summary());
        Ok(OrderDetails::new(order, user, &products))
    }
}
