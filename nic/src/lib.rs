//! NIC Data Plane
//!
//! Cycle-stepped model of a network interface's data path: a receive buffer
//! that holds whole packets and drops bad ones atomically, a reservation
//! buffer that puts out-of-order DMA read data back in order, and the DMA
//! engines and control queues joining them to host memory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Nic (one tick)                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  link ──► PacketBuffer ──► Writer ──► MemoryPort                │
//! │                                          │                      │
//! │  link ◄── RateLimiter ◄── ReservationBuffer ◄── Reader          │
//! │                                                                 │
//! │  NicHandle ◄──► ControlQueues (send/recv requests, completions) │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use morpheus_nic::{Loopback, Nic, NicConfig, SendRequest, SimMemory};
//!
//! let mut lb = Loopback::new(Nic::new(NicConfig::default(), SimMemory::new(0x4000, 8))?);
//! lb.nic_mut().memory_mut().load(0x100, &frame);
//!
//! let handle = lb.nic().handle();
//! handle.post_send(SendRequest::new(0x100, frame.len(), false))?;
//! handle.post_recv(0x1000)?;
//! lb.run_until_idle(10_000);
//!
//! assert_eq!(handle.recv_completion(), Some(frame.len()));
//! ```

#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;

pub mod config;
pub mod control;
pub mod dma;
pub mod error;
pub mod events;
pub mod header;
pub mod nic;
pub mod packet_buffer;
pub mod rate_limiter;
pub mod reservation;
pub mod storage;
pub mod word;

pub use config::{NicConfig, RateLimit};
pub use control::{NicHandle, SendRequest};
pub use dma::{CompletionOrder, MemoryPort, SimMemory};
pub use error::{NicError, Result};
pub use events::{DropReason, EventLog};
pub use header::PacketHeader;
pub use nic::{Loopback, Nic, NicStats};
pub use packet_buffer::{PacketBuffer, PushOutcome};
pub use reservation::ReservationBuffer;
pub use word::{StreamWord, Word};
