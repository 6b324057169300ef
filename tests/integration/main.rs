//! Integration suite: processors, services and gateways wired together over
//! the in-memory store.

mod helpers;

mod callback_test;
mod concurrency_test;
mod conversion_test;
mod delivery_test;
