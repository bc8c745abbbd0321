//! Cart Aggregate
//!
//! The cart is embedded in the user: an ordered list of product lines, unique
//! by product, plus at most one applied coupon.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub items: Vec<CartItem>,
    pub coupon_id: Option<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
}

impl Cart {
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn has_coupon(&self) -> bool { self.coupon_id.is_some() }

    pub fn product_ids(&self) -> Vec<Uuid> { self.items.iter().map(|i| i.product_id).collect() }

    pub fn item(&self, item_id: Uuid) -> Option<&CartItem> { self.items.iter().find(|i| i.id == item_id) }

    pub fn add_item(&mut self, product_id: Uuid, quantity: i32) -> Result<&CartItem, CartError> {
        if quantity <= 0 { return Err(CartError::InvalidQuantity(quantity)); }
        if self.items.iter().any(|i| i.product_id == product_id) {
            return Err(CartError::DuplicateProduct(product_id));
        }
        self.items.push(CartItem { id: Uuid::now_v7(), product_id, quantity });
        Ok(&self.items[self.items.len() - 1])
    }

    pub fn update_quantity(&mut self, item_id: Uuid, quantity: i32) -> Result<(), CartError> {
        if quantity <= 0 { return Err(CartError::InvalidQuantity(quantity)); }
        let item = self.items.iter_mut().find(|i| i.id == item_id).ok_or(CartError::ItemNotFound(item_id))?;
        item.quantity = quantity;
        Ok(())
    }

    pub fn remove_item(&mut self, item_id: Uuid) -> Result<CartItem, CartError> {
        let idx = self.items.iter().position(|i| i.id == item_id).ok_or(CartError::ItemNotFound(item_id))?;
        Ok(self.items.remove(idx))
    }

    pub fn attach_coupon(&mut self, coupon_id: Uuid) -> Result<(), CartError> {
        if self.coupon_id.is_some() { return Err(CartError::CouponAlreadyApplied); }
        self.coupon_id = Some(coupon_id);
        Ok(())
    }

    pub fn detach_coupon(&mut self) -> Option<Uuid> { self.coupon_id.take() }

    /// Empties the cart after an order was created from it.
    pub fn clear(&mut self) {
        self.items.clear();
        self.coupon_id = None;
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CartError {
    #[error("This item is already in your cart.")]
    DuplicateProduct(Uuid),
    #[error("The cart item with the ID `{0}` does not exist.")]
    ItemNotFound(Uuid),
    #[error("Quantity must be an integer greater than 0, got {0}.")]
    InvalidQuantity(i32),
    #[error("A coupon is already applied to your cart.")]
    CouponAlreadyApplied,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cart_rejects_duplicate_product_lines() {
        let mut cart = Cart::default();
        let product = Uuid::now_v7();
        cart.add_item(product, 2).unwrap();
        assert_eq!(cart.add_item(product, 1), Err(CartError::DuplicateProduct(product)));
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 2);
    }

    #[test]
    fn update_and_remove_by_item_id() {
        let mut cart = Cart::default();
        let item_id = cart.add_item(Uuid::now_v7(), 1).unwrap().id;
        cart.update_quantity(item_id, 4).unwrap();
        assert_eq!(cart.item(item_id).map(|i| i.quantity), Some(4));
        assert!(matches!(cart.update_quantity(item_id, 0), Err(CartError::InvalidQuantity(0))));
        cart.remove_item(item_id).unwrap();
        assert!(cart.is_empty());
        assert!(matches!(cart.remove_item(item_id), Err(CartError::ItemNotFound(_))));
    }

    #[test]
    fn one_coupon_at_a_time() {
        let mut cart = Cart::default();
        cart.attach_coupon(Uuid::now_v7()).unwrap();
        assert_eq!(cart.attach_coupon(Uuid::now_v7()), Err(CartError::CouponAlreadyApplied));
        assert!(cart.detach_coupon().is_some());
        assert!(!cart.has_coupon());
    }

    #[test]
    fn clear_drops_items_and_coupon() {
        let mut cart = Cart::default();
        cart.add_item(Uuid::now_v7(), 1).unwrap();
        cart.attach_coupon(Uuid::now_v7()).unwrap();
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.coupon_id, None);
    }
}
