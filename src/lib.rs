//! Purpose: Embeddable query engine over pluggable row stores, used by the `tabula` CLI and tests.
//! Exports: `api` (repository, builders, joins, migrations), `core` (rows, indexes, planning, stores).
//! Role: Library first; the binary is a thin JSON-file front end over `api`.
//! Invariants: Applications depend on `api`; `core` is public for store adapters.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
