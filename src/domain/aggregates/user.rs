//! User Aggregate
//!
//! Owns the address book and the cart. Orders copy what they need out of it.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::cart::Cart;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub addresses: Vec<Address>,
    pub cart: Cart,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self { Self::User => "user", Self::Admin => "admin" }
    }
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub alias: String,
    pub city: String,
    pub details: String,
}

/// The part of an address copied onto an order. It does not follow later
/// edits or deletion of the address it came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub city: String,
    pub details: String,
}

impl Address {
    pub fn new(alias: impl Into<String>, city: impl Into<String>, details: impl Into<String>) -> Self {
        Self { id: Uuid::now_v7(), alias: alias.into(), city: city.into(), details: details.into() }
    }

    pub fn to_shipping(&self) -> ShippingAddress {
        ShippingAddress { city: self.city.clone(), details: self.details.clone() }
    }
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            email: email.into().to_lowercase(),
            role,
            addresses: vec![],
            cart: Cart::default(),
        }
    }

    pub fn address(&self, id: Uuid) -> Option<&Address> { self.addresses.iter().find(|a| a.id == id) }

    pub fn summary(&self) -> UserSummary {
        UserSummary { id: self.id, name: self.name.clone(), email: self.email.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_lookup_is_scoped_to_user() {
        let mut user = User::new("Ana", "Ana@Example.com", Role::User);
        let home = Address::new("home", "Cairo", "12 Nile St");
        let id = home.id;
        user.addresses.push(home);
        assert_eq!(user.email, "ana@example.com");
        assert_eq!(user.address(id).map(Address::to_shipping), Some(ShippingAddress { city: "Cairo".into(), details: "12 Nile St".into() }));
        assert!(user.address(Uuid::now_v7()).is_none());
    }

    #[test]
    fn role_parsing() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert!("root".parse::<Role>().is_err());
    }
}
