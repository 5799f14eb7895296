#![cfg_attr(not(test), no_std)]
#![allow(dead_code)]

//! The Bluetooth Mesh Lower Transport Layer: segmentation/reassembly of
//! Upper Transport PDUs, Segment Acknowledgment handling, and unsegmented
//! pass-through, as a single-threaded cooperative engine driven entirely by
//! [`LowerTransport`]'s public methods.
//!
//! A node wires three collaborators in: a [`network::NetworkLayer`] for
//! outbound wire I/O, an [`upper::UpperTransportHandler`] for delivering
//! received/sent outcomes upward, and a [`timer::TimerSource`] for the
//! ack/incomplete timers. Everything else — peer table, sequence counter,
//! ingress/egress queues, the single in-flight outgoing message — lives in
//! [`dispatcher::LowerTransport`] itself.

pub mod dispatcher;
pub mod error;
pub mod network;
pub mod peer;
pub mod queue;
pub mod reassembly;
pub mod segmentation;
pub mod sequence;
pub mod timer;
pub mod upper;

pub use dispatcher::{EgressItem, LowerTransport, LowerTransportDump};
pub use error::LowerTransportError;
pub use network::{NetworkLayer, SendToken};
pub use segmentation::DEFAULT_UNICAST_RETRIES;
pub use timer::{TimerEvent, TimerId, TimerSource};
pub use upper::{NetworkHeader, SendOutcome, UpperTransportHandler, UpperTransportPdu};
