// SPDX-License-Identifier: Apache-2.0

//! Core types shared across the Weave sync layer.

mod block;
mod codec;
mod config;
mod crypto;
mod database;
pub mod error;
mod message;
mod notifier;
mod task;
mod traits;

pub use block::*;
pub use codec::*;
pub use config::*;
pub use crypto::*;
pub use database::*;
pub use error::*;
pub use message::*;
pub use notifier::*;
pub use task::*;
pub use traits::*;
