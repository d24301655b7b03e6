/*
Blocking one-slot handoff primitives: a bounded channel where producers
and consumers rendezvous over a single slot, plus the cancellation token
and counting semaphore used around it.
*/

pub mod cancel;
pub mod channel;
pub mod common;
pub mod semaphore;
