pub mod events;
pub mod health;
pub mod media;
pub mod search;
pub mod tags;
pub mod uploads;
