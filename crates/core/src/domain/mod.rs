pub mod conversation;
pub mod order;
pub mod product;
