// SPDX-License-Identifier: MPL-2.0

mod discord;
mod message;

pub use discord::{Delivery, DeliveryError, DeliveryOutcome, DiscordDelivery};
pub use message::{Notification, assemble};
