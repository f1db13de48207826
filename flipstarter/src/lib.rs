mod campaign;
mod codec;
mod contract;
mod crypto;
mod electrum;
mod error;
mod service;
mod threshold;
mod types;
mod validator;
mod watcher;

#[cfg(test)]
mod test_utils;

pub use campaign::*;
pub use codec::*;
pub use contract::*;
pub use crypto::*;
pub use electrum::*;
pub use error::*;
pub use service::*;
pub use threshold::*;
pub use types::*;
pub use validator::*;
pub use watcher::*;

#[macro_use]
extern crate log;
