//! Request middleware

pub mod wallet;

pub use wallet::{wallet_middleware, WalletContext, WALLET_HEADER};
