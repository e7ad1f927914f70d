//! This crates contains the types and methods needed to interact
//! with DICOM nodes through the upper layer protocol.
//!
//! This crate can be used as a base
//! for finite-state machines and higher-level helpers,
//! enabling the creation of concrete service class users (SCUs)
//! and service class providers (SCPs).
//!
//! - The [`address`] module
//!   provides an abstraction for working with compound addresses
//!   referring to application entities in a network.
//! - The [`ae`] module
//!   configures an application entity's own AE title, timeouts and
//!   presentation contexts, and exposes its `associate` and `start_server`
//!   entry points.
//! - The [`pdu`] module
//!   provides data structures representing _protocol data units_,
//!   which are passed around as part of the DICOM network communication support.
//! - The [`association`] module
//!   comprises abstractions for establishing and negotiating associations
//!   between application entities,
//!   via the upper layer protocol by TCP.
//! - The [`dimse`] module
//!   exchanges whole DIMSE messages -- command sets and data sets --
//!   over an established association.
//! - The [`sm`] module
//!   holds the pure state machine driving association negotiation and
//!   release, as defined by the standard's state transition table.
//! - The [`event`] module
//!   provides a tagged association lifecycle event and a handler registry
//!   callers can use to react to it (association established, requested,
//!   a C-STORE arriving, abort, release).
//!
//! ## Features
//! * `async`: Enables a fully async implementation of the upper layer protocol.
//!   See [`ClientAssociationOptions`] and [`ServerAssociationOptions`] for details

pub mod address;
pub mod ae;
pub mod association;
pub mod dimse;
pub mod event;
pub mod pdu;
pub mod sm;

/// The current implementation class UID generically referring to this implementation.
///
/// Automatically generated as per the standard, part 5, section B.2.
///
/// This UID may change in future versions,
/// even between patch versions.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.156227610253341005307660858504280353500";

/// The current implementation version name generically referring to this implementation.
///
/// This name may change in future versions,
/// even between patch versions.
pub const IMPLEMENTATION_VERSION_NAME: &str = "RUST_UL_0.1";

// re-exports

pub use address::{AeAddr, FullAeAddr};
pub use association::client::{ClientAssociation, ClientAssociationOptions};
pub use association::server::{ServerAssociation, ServerAssociationOptions};
pub use event::{Event, EventHandlers};
pub use pdu::read_pdu;
pub use pdu::write_pdu;
pub use pdu::Pdu;
