//! Call recording and replay for deterministic tests.
//!
//! # Overview
//!
//! A mocked factory hands out `Proxy` values. Each construction and each call
//! on a proxy is turned into a `Call` record keyed by
//! `(instance_index, call_index)`:
//! 1. **Unlocked**: records that are missing are produced by calling the
//!    real target and stored in the shared memory.
//! 2. **Locked**: every call must already be in memory; the real target is
//!    never touched.
//!
//! Persisting the memory between runs (see `storage`) turns a recording run
//! into a fixture that later runs replay call for call.

pub mod call;
pub mod proxy;
pub mod reply;
