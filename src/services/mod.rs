pub mod activity;
pub mod carts;
pub mod orders;
pub mod payments;
pub mod proformas;
pub mod suppliers;
pub mod tokens;

pub use activity::ActivityService;
pub use carts::CartService;
pub use orders::OrderService;
pub use payments::{PaymentProvider, PaymentService};
pub use proformas::ProformaService;
pub use suppliers::SupplierService;
