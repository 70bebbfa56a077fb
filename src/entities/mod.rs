pub mod activity;
pub mod approval_action;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod product;
pub mod proforma;
pub mod proforma_item;
pub mod supplier;

pub use activity::Entity as Activity;
pub use approval_action::Entity as ApprovalAction;
pub use cart_item::Entity as CartItem;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use product::Entity as Product;
pub use proforma::Entity as Proforma;
pub use proforma_item::Entity as ProformaItem;
pub use supplier::Entity as Supplier;
