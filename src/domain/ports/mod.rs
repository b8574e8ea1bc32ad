//! Domain ports
//!
//! Contracts for collaborators outside the settlement core: the external
//! payment provider and the coupon/discount engine.

pub mod discount;
pub mod gateway;

pub use discount::{DiscountPolicy, NoDiscount};
pub use gateway::{
    CallbackPayload, PaymentGateway, PaymentQuery, PaymentRedirect, PaymentRequest,
    ProviderTradeStatus, VerifiedCallback,
};
