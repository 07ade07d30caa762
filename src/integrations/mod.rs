//! Clients for the services this shop depends on but does not own: the
//! payment gateway, outbound mail and Google sign-in.

pub mod google;
pub mod mail;
pub mod payment;

pub use google::{GoogleVerifier, IdentityError, IdentityVerifier, VerifiedIdentity};
pub use mail::{LogMailer, MailError, Mailer, OutboundEmail};
pub use payment::{GatewayError, GatewayOrder, GatewayRefund, PaymentGateway, RazorpayGateway};
