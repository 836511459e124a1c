pub mod order;
pub mod order_event;
pub mod order_item;
pub mod product;
pub mod shop;
