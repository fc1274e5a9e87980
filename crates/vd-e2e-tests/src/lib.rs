//! End-to-end tests for vdash live under `tests/`; this crate has no
//! runtime code.
