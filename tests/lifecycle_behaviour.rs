//! Behavioural scenarios for the configuration lifecycle.

mod lifecycle;
