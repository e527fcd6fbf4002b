#![allow(dead_code)]

pub mod backends;
pub mod socket_guard;
