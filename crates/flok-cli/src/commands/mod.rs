//! Command implementations

pub(crate) mod clear;
pub(crate) mod common;
pub(crate) mod down;
pub(crate) mod lock;
pub(crate) mod show;
pub(crate) mod up;
