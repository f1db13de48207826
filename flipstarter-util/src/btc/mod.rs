mod electrum;

pub use electrum::*;
