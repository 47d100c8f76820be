pub mod cart;
pub mod inventory;
pub mod orders;
pub mod payments;
