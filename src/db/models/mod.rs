//! Database request/response models.

pub mod users;
