// src/os/mod.rs

//! Linux primitives shared by the device backends.

pub mod epoll;
