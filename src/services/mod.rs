//! Application services over the record store
pub mod account;
pub mod admin;
pub mod catalog;
pub mod checkout;
pub mod reconcile;

pub use account::{AccountError, AccountOverview, AccountService, AddressBook, OrderView};
pub use admin::{AdminConsole, AdminError, DashboardStats, OrderDetail, StatusChange};
pub use catalog::CatalogReader;
pub use checkout::{
    BuyerForm, CheckoutError, CheckoutOrchestrator, OrderConfirmation, PaymentMethod, PendingCheckout, ValidatedBuyer,
    ValidationError,
};
pub use reconcile::{CustomerReconciler, ReconcileStrategy, Reconciliation};
